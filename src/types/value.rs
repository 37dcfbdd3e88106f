//! In-process (managed) values

use super::enums::{EnumSetValue, EnumValue};
use super::native::{NativeType, NativeValue};
use crate::closure::Callable;
use crate::error::MarshalError;
use crate::layout::Struct;
use crate::runtime::Platform;
use std::fmt;
use std::sync::Arc;

/// A managed value at a signature position.
///
/// Arrays hold their elements as values; boxed arrays use `Null` for
/// missing elements.
#[derive(Clone)]
pub enum Value {
    /// Result of a `void` function
    Void,
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    NativeLong(i64),
    Address(usize),
    String(String),
    Enum(EnumValue),
    EnumSet(EnumSetValue),
    Struct(Struct),
    /// Scalar cell passed by reference
    Reference(Box<Value>),
    Array(Vec<Value>),
    Callback(Arc<dyn Callable>),
}

impl Value {
    /// Name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "i8",
            Self::Short(_) => "i16",
            Self::Int(_) => "i32",
            Self::Long(_) => "i64",
            Self::Float(_) => "f32",
            Self::Double(_) => "f64",
            Self::NativeLong(_) => "native long",
            Self::Address(_) => "address",
            Self::String(_) => "string",
            Self::Enum(_) => "enum",
            Self::EnumSet(_) => "enum set",
            Self::Struct(_) => "struct",
            Self::Reference(_) => "reference",
            Self::Array(_) => "array",
            Self::Callback(_) => "callback",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of integer-like values
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Bool(v) => Some(v as i64),
            Self::Byte(v) => Some(v as i64),
            Self::Short(v) => Some(v as i64),
            Self::Int(v) => Some(v as i64),
            Self::Long(v) | Self::NativeLong(v) => Some(v),
            Self::Address(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Floating point view of numeric values
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v as f64),
            Self::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// Managed value of a native scalar read as `ty`.
    ///
    /// Unsigned values widen into the next larger signed kind so they stay
    /// non-negative (`u8` -> `Short`, `u16` -> `Int`, `u32` -> `Long`); `u64`
    /// keeps its bit pattern in a `Long`.
    pub fn from_native_scalar(ty: NativeType, native: NativeValue) -> Self {
        if matches!(ty, NativeType::SLong | NativeType::ULong) {
            return Self::NativeLong(native.as_i64());
        }
        match native {
            NativeValue::Void => Self::Void,
            NativeValue::I8(v) => Self::Byte(v),
            NativeValue::U8(v) => Self::Short(v as i16),
            NativeValue::I16(v) => Self::Short(v),
            NativeValue::U16(v) => Self::Int(v as i32),
            NativeValue::I32(v) => Self::Int(v),
            NativeValue::U32(v) => Self::Long(v as i64),
            NativeValue::I64(v) => Self::Long(v),
            NativeValue::U64(v) => Self::Long(v as i64),
            NativeValue::F32(v) => Self::Float(v),
            NativeValue::F64(v) => Self::Double(v),
            NativeValue::Address(v) => Self::Address(v),
        }
    }

    /// Native scalar of type `ty`; integers truncate to its width
    pub fn to_native_scalar(&self, ty: NativeType, platform: &Platform) -> Result<NativeValue, MarshalError> {
        if ty.is_float() {
            return match self.as_f64() {
                Some(v) => Ok(NativeValue::from_f64(ty, v)),
                None => Err(self.mismatch(ty)),
            };
        }
        let integer = match self {
            Self::Null => {
                return Err(MarshalError::NullValue {
                    expected: ty.c_name().to_string(),
                })
            }
            Self::Enum(constant) => Some(constant.value()),
            Self::EnumSet(set) => Some(set.mask()),
            Self::Struct(s) => Some(s.address() as i64),
            other => other.as_i64(),
        };
        integer
            .map(|v| NativeValue::from_i64(ty, v, platform))
            .ok_or_else(|| self.mismatch(ty))
    }

    pub(crate) fn mismatch(&self, expected: impl fmt::Display) -> MarshalError {
        MarshalError::TypeMismatch {
            expected: expected.to_string(),
            found: self.kind().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Void, Self::Void) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::NativeLong(a), Self::NativeLong(b)) => a == b,
            (Self::Address(a), Self::Address(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::EnumSet(a), Self::EnumSet(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => {
                a.address() == b.address() && a.layout().name() == b.layout().name()
            }
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Callback(a), Self::Callback(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("Void"),
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({})", v),
            Self::Byte(v) => write!(f, "Byte({})", v),
            Self::Short(v) => write!(f, "Short({})", v),
            Self::Int(v) => write!(f, "Int({})", v),
            Self::Long(v) => write!(f, "Long({})", v),
            Self::Float(v) => write!(f, "Float({})", v),
            Self::Double(v) => write!(f, "Double({})", v),
            Self::NativeLong(v) => write!(f, "NativeLong({})", v),
            Self::Address(v) => write!(f, "Address({:#x})", v),
            Self::String(v) => write!(f, "String({:?})", v),
            Self::Enum(v) => write!(f, "Enum({})", v),
            Self::EnumSet(v) => f.debug_set().entries(v.names()).finish(),
            Self::Struct(v) => write!(f, "Struct({} @ {:#x})", v.layout().name(), v.address()),
            Self::Reference(v) => write!(f, "Reference({:?})", v),
            Self::Array(v) => f.debug_list().entries(v.iter()).finish(),
            Self::Callback(v) => write!(f, "Callback({:p})", Arc::as_ptr(v) as *const ()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Struct> for Value {
    fn from(v: Struct) -> Self {
        Self::Struct(v)
    }
}
