use super::{FromNativeContext, FromNativeConverter, NativeArg, ToNativeContext, ToNativeConverter};
use crate::error::MarshalError;
use crate::layout::{Struct, StructLayout};
use crate::memory::Pointer;
use crate::types::{NativeType, NativeValue, Value};
use std::sync::Arc;

/// Aggregate argument passed as the address of its memory
#[derive(Debug, Clone)]
pub struct StructToNative {
    layout: Arc<StructLayout>,
}

impl StructToNative {
    pub fn new(layout: Arc<StructLayout>) -> Self {
        Self { layout }
    }
}

impl ToNativeConverter for StructToNative {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, _ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        match value {
            Value::Null => Ok(NativeArg::null()),
            Value::Struct(s) if s.layout().name() == self.layout.name() => {
                Ok(NativeArg::new(NativeValue::Address(s.address())))
            }
            other => Err(other.mismatch(format!("struct {}", self.layout.name()))),
        }
    }
}

/// Returned aggregate pointer, wrapped in a non-owning view
#[derive(Debug, Clone)]
pub struct StructFromNative {
    layout: Arc<StructLayout>,
}

impl StructFromNative {
    pub fn new(layout: Arc<StructLayout>) -> Self {
        Self { layout }
    }
}

impl FromNativeConverter for StructFromNative {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        match value.as_address() {
            0 => Ok(Value::Null),
            address => Ok(Value::Struct(Struct::view(
                Arc::clone(ctx.runtime()),
                Arc::clone(&self.layout),
                Pointer::new(address),
                None,
            ))),
        }
    }
}
