//! Strings in both directions and caller-owned string buffers

use super::{FromNativeContext, FromNativeConverter, NativeArg, ToNativeContext, ToNativeConverter};
use crate::error::MarshalError;
use crate::memory::{Memory, Pointer};
use crate::types::{Direction, NativeType, NativeValue, Value};

/// Returned `char*` decoded with the configured encoding; null maps to `Null`
#[derive(Debug, Clone, Copy, Default)]
pub struct StringResultConverter;

impl FromNativeConverter for StringResultConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        let address = value.as_address();
        if address == 0 {
            return Ok(Value::Null);
        }
        let s = unsafe { Pointer::new(address).get_string(0, None, ctx.encoding())? };
        Ok(Value::String(s))
    }
}

/// Read-only string argument, copied into a NUL-terminated scratch buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct CharSequenceConverter;

impl ToNativeConverter for CharSequenceConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        match value {
            Value::Null => Ok(NativeArg::null()),
            Value::String(s) => {
                let bytes = ctx.encoding().encode(s)?;
                Ok(NativeArg::buffer(Memory::from_bytes(&bytes, 1)?))
            }
            other => Err(other.mismatch("string")),
        }
    }
}

/// Which managed buffer type a `StringBuilderConverter` serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFlavor {
    /// Exclusively owned by the caller
    Builder,
    /// Shared with other holders
    Buffer,
}

/// Growable string buffer native code may write into.
///
/// The scratch buffer holds the string's capacity plus a terminator, so a
/// caller reserving space with `String::with_capacity` gives native code
/// that much room. Copy-back replaces the string's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringBuilderConverter {
    flavor: BufferFlavor,
    direction: Direction,
}

impl StringBuilderConverter {
    pub fn new(flavor: BufferFlavor, direction: Direction) -> Self {
        Self { flavor, direction }
    }

    #[inline]
    pub fn flavor(&self) -> BufferFlavor {
        self.flavor
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl ToNativeConverter for StringBuilderConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let s = match value {
            Value::Null => return Ok(NativeArg::null()),
            Value::String(s) => s,
            other => return Err(other.mismatch("string buffer")),
        };

        let bytes = ctx.encoding().encode(s)?;
        let capacity = s.capacity().max(bytes.len()) + 1;
        let memory = Memory::allocate_for_call(capacity)?;
        if self.direction.copies_in() {
            unsafe { memory.pointer().put_string(0, capacity, s, ctx.encoding())? };
        }
        Ok(NativeArg::buffer(memory))
    }

    fn post_invoke(&self, value: &mut Value, arg: &NativeArg, ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        if !self.direction.copies_out() {
            return Ok(());
        }
        let (Value::String(s), Some(memory)) = (value, arg.primary()) else {
            return Ok(());
        };
        let updated = unsafe { memory.pointer().get_string(0, Some(memory.size()), ctx.encoding())? };
        s.clear();
        s.push_str(&updated);
        Ok(())
    }

    fn needs_post_invoke(&self) -> bool {
        self.direction.copies_out()
    }
}
