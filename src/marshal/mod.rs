//! Converters between managed values and the native call representation
//!
//! Architecture:
//! - `scalar.rs` - aliased scalars and native `long`
//! - `enums.rs` - enum constants and enum sets
//! - `strings.rs` - strings, char sequences and growable string buffers
//! - `byref.rs` - scalars passed through a pointer
//! - `structs.rs` - aggregates passed by reference
//! - `array.rs` - array parameters (primitive, boxed, pointer, struct, string)
//!
//! A converter is bound at resolution time to everything that does not
//! depend on the call (widths, direction, layout) and is then reused for
//! every call through that signature position.

mod array;
mod byref;
mod enums;
mod scalar;
mod strings;
mod structs;

pub use array::{ArrayElement, PointerArrayConverter, ScalarArrayConverter, StringArrayConverter, StructArrayConverter};
pub use byref::ByReferenceConverter;
pub use enums::{EnumConverter, EnumSetConverter};
pub use scalar::{DirectConverter, NativeLongConverter, ScalarConverter};
pub use strings::{BufferFlavor, CharSequenceConverter, StringBuilderConverter, StringResultConverter};
pub use structs::{StructFromNative, StructToNative};

use crate::config::{MarshalConfig, StringEncoding};
use crate::error::MarshalError;
use crate::memory::Memory;
use crate::runtime::{Platform, Runtime};
use crate::types::{NativeType, NativeValue, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Per-call view of the runtime a converter runs against
#[derive(Clone, Copy)]
pub struct MarshalContext<'a> {
    runtime: &'a Arc<Runtime>,
}

/// Context of a managed-to-native conversion
pub type ToNativeContext<'a> = MarshalContext<'a>;

/// Context of a native-to-managed conversion
pub type FromNativeContext<'a> = MarshalContext<'a>;

impl<'a> MarshalContext<'a> {
    pub fn new(runtime: &'a Arc<Runtime>) -> Self {
        Self { runtime }
    }

    #[inline]
    pub fn runtime(&self) -> &'a Arc<Runtime> {
        self.runtime
    }

    #[inline]
    pub fn platform(&self) -> &'a Platform {
        self.runtime.platform()
    }

    #[inline]
    pub fn config(&self) -> &'a MarshalConfig {
        self.runtime.config()
    }

    #[inline]
    pub fn encoding(&self) -> StringEncoding {
        self.runtime.config().string_encoding
    }
}

impl fmt::Debug for MarshalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalContext")
            .field("platform", self.platform())
            .finish()
    }
}

/// A converted argument: the native value handed to the transport plus
/// the scratch memory it points into. The storage must outlive the call
/// and is read again by `post_invoke`.
#[derive(Debug)]
pub struct NativeArg {
    value: NativeValue,
    storage: SmallVec<[Memory; 1]>,
}

impl NativeArg {
    pub fn new(value: NativeValue) -> Self {
        Self {
            value,
            storage: SmallVec::new(),
        }
    }

    /// Argument pointing at the start of `memory`
    pub fn buffer(memory: Memory) -> Self {
        let mut arg = Self::new(NativeValue::Address(memory.address()));
        arg.storage.push(memory);
        arg
    }

    pub fn null() -> Self {
        Self::new(NativeValue::null())
    }

    #[inline]
    pub fn value(&self) -> NativeValue {
        self.value
    }

    /// Scratch blocks, primary buffer first
    #[inline]
    pub fn storage(&self) -> &[Memory] {
        &self.storage
    }

    pub(crate) fn keep(&mut self, memory: Memory) {
        self.storage.push(memory);
    }

    /// Primary buffer, if the argument owns one
    pub fn primary(&self) -> Option<&Memory> {
        self.storage.first()
    }
}

/// Managed-to-native conversion for one signature position
pub trait ToNativeConverter: Send + Sync + fmt::Debug {
    /// Native type the transport passes
    fn native_type(&self) -> NativeType;

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError>;

    /// Copy native-side mutations back into `value` after the call
    fn post_invoke(&self, _value: &mut Value, _arg: &NativeArg, _ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        Ok(())
    }

    /// Whether `post_invoke` does anything; lets call sites skip it
    fn needs_post_invoke(&self) -> bool {
        false
    }
}

/// Native-to-managed conversion for one signature position
pub trait FromNativeConverter: Send + Sync + fmt::Debug {
    fn native_type(&self) -> NativeType;

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError>;
}
