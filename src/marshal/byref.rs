use super::scalar::primitive_value;
use super::{NativeArg, ToNativeContext, ToNativeConverter};
use crate::error::MarshalError;
use crate::memory::Memory;
use crate::types::{DeclaredType, Direction, NativeType, NativeValue, Value};

/// Scalar cell passed as a pointer to scratch memory (`int *out`).
///
/// The referent is written before the call when the direction copies in and
/// read back into the `Reference` cell afterwards when it copies out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByReferenceConverter {
    referent: DeclaredType,
    native: NativeType,
    direction: Direction,
}

impl ByReferenceConverter {
    pub fn new(referent: DeclaredType, native: NativeType, direction: Direction) -> Self {
        Self {
            referent,
            native,
            direction,
        }
    }

    fn managed(&self, native: NativeValue) -> Value {
        match &self.referent {
            DeclaredType::Primitive(p) | DeclaredType::Boxed(p) => primitive_value(*p, native),
            DeclaredType::NativeLong => Value::NativeLong(native.as_i64()),
            _ => Value::Address(native.as_address()),
        }
    }
}

impl ToNativeConverter for ByReferenceConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let cell = match value {
            Value::Null => return Ok(NativeArg::null()),
            Value::Reference(cell) => cell,
            other => return Err(other.mismatch(format!("&mut {}", self.referent))),
        };

        let memory = Memory::allocate_for_call(self.native.size(ctx.platform()))?;
        if self.direction.copies_in() && !cell.is_null() {
            let native = cell.to_native_scalar(self.native, ctx.platform())?;
            unsafe { memory.pointer().put(0, self.native, native, ctx.platform()) };
        }
        Ok(NativeArg::buffer(memory))
    }

    fn post_invoke(&self, value: &mut Value, arg: &NativeArg, ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        if !self.direction.copies_out() {
            return Ok(());
        }
        if let (Value::Reference(cell), Some(memory)) = (value, arg.primary()) {
            let native = unsafe { memory.pointer().get(0, self.native, ctx.platform()) };
            **cell = self.managed(native);
        }
        Ok(())
    }

    fn needs_post_invoke(&self) -> bool {
        self.direction.copies_out()
    }
}
