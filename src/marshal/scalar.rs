//! Aliased scalars and native `long`

use super::{FromNativeContext, FromNativeConverter, NativeArg, ToNativeContext, ToNativeConverter};
use crate::error::MarshalError;
use crate::types::{DeclaredType, NativeType, NativeValue, Primitive, Value};

/// Managed value of kind `primitive` holding `native`'s integer or float
pub(crate) fn primitive_value(primitive: Primitive, native: NativeValue) -> Value {
    match primitive {
        Primitive::Bool => Value::Bool(native.as_i64() != 0),
        Primitive::Byte => Value::Byte(native.as_i64() as i8),
        Primitive::Short => Value::Short(native.as_i64() as i16),
        Primitive::Int => Value::Int(native.as_i64() as i32),
        Primitive::Long => Value::Long(native.as_i64()),
        Primitive::Float => Value::Float(native.as_f64() as f32),
        Primitive::Double => Value::Double(native.as_f64()),
    }
}

/// Integer primitive whose native width and signedness come from an alias.
///
/// Going to native the value is truncated to the alias width; coming back
/// it is zero- or sign-extended per the alias, then stored in the declared
/// primitive (so `u_int8_t` returning `0xdead0001` yields 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarConverter {
    primitive: Primitive,
    native: NativeType,
}

impl ScalarConverter {
    pub fn new(primitive: Primitive, native: NativeType) -> Self {
        Self { primitive, native }
    }
}

impl ToNativeConverter for ScalarConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        value
            .to_native_scalar(self.native, ctx.platform())
            .map(NativeArg::new)
    }
}

impl FromNativeConverter for ScalarConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        let narrowed = NativeValue::from_i64(self.native, value.as_i64(), ctx.platform());
        Ok(primitive_value(self.primitive, narrowed))
    }
}

/// Native `long`, fixed at resolution to a 32- or 64-bit strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeLongConverter {
    Int32 { unsigned: bool },
    Int64 { unsigned: bool },
}

impl NativeLongConverter {
    pub fn for_width(width: usize, unsigned: bool) -> Self {
        if width == 4 {
            Self::Int32 { unsigned }
        } else {
            Self::Int64 { unsigned }
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::Int32 { .. } => 4,
            Self::Int64 { .. } => 8,
        }
    }

    fn native(&self) -> NativeType {
        match *self {
            Self::Int32 { unsigned: false } => NativeType::SInt,
            Self::Int32 { unsigned: true } => NativeType::UInt,
            Self::Int64 { unsigned: false } => NativeType::SLongLong,
            Self::Int64 { unsigned: true } => NativeType::ULongLong,
        }
    }
}

impl ToNativeConverter for NativeLongConverter {
    fn native_type(&self) -> NativeType {
        self.native()
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        value
            .to_native_scalar(self.native(), ctx.platform())
            .map(NativeArg::new)
    }
}

impl FromNativeConverter for NativeLongConverter {
    fn native_type(&self) -> NativeType {
        self.native()
    }

    fn from_native(&self, value: NativeValue, ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        let narrowed = NativeValue::from_i64(self.native(), value.as_i64(), ctx.platform());
        Ok(Value::NativeLong(narrowed.as_i64()))
    }
}

/// Unconverted scalar, pointer or `void` position.
///
/// Used where the resolver reports no transformation but a converter object
/// is still needed, e.g. for callback parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectConverter {
    primitive: Option<Primitive>,
    native: NativeType,
}

impl DirectConverter {
    pub fn new(primitive: Option<Primitive>, native: NativeType) -> Self {
        Self { primitive, native }
    }

    /// Pass-through for `declared` with its effective native type
    pub fn for_declared(declared: &DeclaredType, native: NativeType) -> Self {
        match declared {
            DeclaredType::Primitive(p) | DeclaredType::Boxed(p) => Self::new(Some(*p), native),
            DeclaredType::Void => Self::new(None, NativeType::Void),
            _ => Self::new(None, NativeType::Address),
        }
    }
}

impl ToNativeConverter for DirectConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        match (self.native, value) {
            (NativeType::Void, _) => Ok(NativeArg::new(NativeValue::Void)),
            (NativeType::Address, Value::Null) => Ok(NativeArg::null()),
            _ => value
                .to_native_scalar(self.native, ctx.platform())
                .map(NativeArg::new),
        }
    }
}

impl FromNativeConverter for DirectConverter {
    fn native_type(&self) -> NativeType {
        self.native
    }

    fn from_native(&self, value: NativeValue, _ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        Ok(match (self.primitive, self.native) {
            (Some(p), _) => primitive_value(p, value),
            (None, NativeType::Void) => Value::Void,
            (None, _) => Value::Address(value.as_address()),
        })
    }
}
