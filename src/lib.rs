//! nativecall - native-call marshalling and aggregate layout engine
//!
//! Decides how in-process values are converted to and from the native
//! calling representation, computes the byte layout of structs and unions
//! exchanged with native code, and bridges callbacks in both directions.
//!
//! The physical call transport is not part of this crate; implement
//! [`NativeInvoker`] and install it with [`Runtime::set_invoker`].

pub mod closure;
pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod marshal;
pub mod memory;
pub mod resolver;
pub mod runtime;
pub mod types;

// Re-export core types
pub use closure::{Callable, ClosureBridge, ClosureManager, NativeClosure, NativeFunction};
pub use config::{ConfigError, DirectionPolicy, MarshalConfig, StringEncoding};
pub use error::{LayoutError, MappingError, MarshalError};
pub use layout::{AggregateDecl, FieldType, Struct, StructLayout, StructRef};
pub use marshal::{FromNativeContext, FromNativeConverter, MarshalContext, NativeArg, ToNativeContext, ToNativeConverter};
pub use memory::{Memory, Pointer};
pub use resolver::ConverterResolver;
pub use runtime::{CallingConvention, NativeInvoker, NativeSignature, Platform, Runtime};
pub use types::{
    CallbackSignature, DeclaredType, Direction, Modifiers, NativeType, NativeValue, ParameterFlags, Primitive,
    SignatureType, TypeAlias, Value,
};
