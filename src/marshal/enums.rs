use super::{FromNativeContext, FromNativeConverter, NativeArg, ToNativeContext, ToNativeConverter};
use crate::error::MarshalError;
use crate::types::{EnumSetValue, EnumType, NativeType, NativeValue, Value};
use std::sync::Arc;

/// Enum constant passed as its integer value
#[derive(Debug, Clone)]
pub struct EnumConverter {
    ty: Arc<EnumType>,
    native: NativeType,
}

impl EnumConverter {
    pub fn new(ty: Arc<EnumType>, native: NativeType) -> Self {
        Self { ty, native }
    }
}

impl ToNativeConverter for EnumConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        match value {
            Value::Enum(constant) if constant.enum_type().name() == self.ty.name() => Ok(NativeArg::new(
                NativeValue::from_i64(self.native, constant.value(), ctx.platform()),
            )),
            Value::Null => Err(MarshalError::NullValue {
                expected: format!("enum {}", self.ty.name()),
            }),
            other => Err(other.mismatch(format!("enum {}", self.ty.name()))),
        }
    }
}

impl FromNativeConverter for EnumConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        let value = NativeValue::from_i64(self.native, value.as_i64(), ctx.platform()).as_i64();
        self.ty
            .from_value(value)
            .map(Value::Enum)
            .ok_or_else(|| MarshalError::UnknownEnumValue {
                ty: self.ty.name().to_string(),
                value,
            })
    }
}

/// Set of enum constants passed as the OR of their values; null is the
/// empty set
#[derive(Debug, Clone)]
pub struct EnumSetConverter {
    ty: Arc<EnumType>,
    native: NativeType,
}

impl EnumSetConverter {
    pub fn new(ty: Arc<EnumType>, native: NativeType) -> Self {
        Self { ty, native }
    }
}

impl ToNativeConverter for EnumSetConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let mask = match value {
            Value::EnumSet(set) if set.enum_type().name() == self.ty.name() => set.mask(),
            Value::Null => 0,
            other => return Err(other.mismatch(format!("set<{}>", self.ty.name()))),
        };
        Ok(NativeArg::new(NativeValue::from_i64(self.native, mask, ctx.platform())))
    }
}

impl FromNativeConverter for EnumSetConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        let mask = NativeValue::from_i64(self.native, value.as_i64(), ctx.platform()).as_i64();
        Ok(Value::EnumSet(EnumSetValue::from_mask(&self.ty, mask)))
    }
}
