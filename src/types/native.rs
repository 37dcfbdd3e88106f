//! Native type descriptors compatible with C ABIs.

use crate::runtime::Platform;
use std::fmt;

/// C-level type of a value crossing the native boundary.
///
/// `SLong`/`ULong` follow the platform's `long`, `Address` the platform's
/// pointer width. Everything else has a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NativeType {
    Void,
    SChar,
    UChar,
    SShort,
    UShort,
    SInt,
    UInt,
    SLong,
    ULong,
    SLongLong,
    ULongLong,
    Float,
    Double,
    Address,
}

impl NativeType {
    /// Size of type in bytes on `platform`
    #[inline]
    pub const fn size(self, platform: &Platform) -> usize {
        match self {
            Self::Void => 0,
            Self::SChar | Self::UChar => 1,
            Self::SShort | Self::UShort => 2,
            Self::SInt | Self::UInt | Self::Float => 4,
            Self::SLongLong | Self::ULongLong | Self::Double => 8,
            Self::SLong | Self::ULong => platform.long_size,
            Self::Address => platform.address_size,
        }
    }

    /// Natural alignment, capped at the platform's maximum scalar alignment
    #[inline]
    pub const fn align(self, platform: &Platform) -> usize {
        let size = self.size(platform);
        if size == 0 {
            1
        } else if size > platform.max_align {
            platform.max_align
        } else {
            size
        }
    }

    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::SChar
                | Self::UChar
                | Self::SShort
                | Self::UShort
                | Self::SInt
                | Self::UInt
                | Self::SLong
                | Self::ULong
                | Self::SLongLong
                | Self::ULongLong
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    #[inline]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::UChar | Self::UShort | Self::UInt | Self::ULong | Self::ULongLong | Self::Address
        )
    }

    pub const fn c_name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::SChar => "signed char",
            Self::UChar => "unsigned char",
            Self::SShort => "short",
            Self::UShort => "unsigned short",
            Self::SInt => "int",
            Self::UInt => "unsigned int",
            Self::SLong => "long",
            Self::ULong => "unsigned long",
            Self::SLongLong => "long long",
            Self::ULongLong => "unsigned long long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Address => "void*",
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// A native value, tagged with its concrete width and signedness
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    Void,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Address(usize),
}

impl NativeValue {
    /// Null pointer
    #[inline]
    pub const fn null() -> Self {
        Self::Address(0)
    }

    /// Zero of the given native type
    pub fn zero(ty: NativeType, platform: &Platform) -> Self {
        if ty.is_float() {
            Self::from_f64(ty, 0.0)
        } else {
            Self::from_i64(ty, 0, platform)
        }
    }

    /// Truncating conversion of an integer into `ty`
    pub fn from_i64(ty: NativeType, value: i64, platform: &Platform) -> Self {
        match ty {
            NativeType::Void => Self::Void,
            NativeType::SChar => Self::I8(value as i8),
            NativeType::UChar => Self::U8(value as u8),
            NativeType::SShort => Self::I16(value as i16),
            NativeType::UShort => Self::U16(value as u16),
            NativeType::SInt => Self::I32(value as i32),
            NativeType::UInt => Self::U32(value as u32),
            NativeType::SLongLong => Self::I64(value),
            NativeType::ULongLong => Self::U64(value as u64),
            NativeType::SLong if platform.long_size == 4 => Self::I32(value as i32),
            NativeType::SLong => Self::I64(value),
            NativeType::ULong if platform.long_size == 4 => Self::U32(value as u32),
            NativeType::ULong => Self::U64(value as u64),
            NativeType::Float => Self::F32(value as f32),
            NativeType::Double => Self::F64(value as f64),
            NativeType::Address => Self::Address(platform.mask_address(value as u64 as usize)),
        }
    }

    /// Floating point value of `ty`; integer targets truncate toward zero
    pub fn from_f64(ty: NativeType, value: f64) -> Self {
        match ty {
            NativeType::Float => Self::F32(value as f32),
            NativeType::Double => Self::F64(value),
            NativeType::Void => Self::Void,
            _ => Self::I64(value as i64),
        }
    }

    /// Integer view: signed variants sign-extend, unsigned variants zero-extend
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Void => 0,
            Self::I8(v) => v as i64,
            Self::U8(v) => v as i64,
            Self::I16(v) => v as i64,
            Self::U16(v) => v as i64,
            Self::I32(v) => v as i64,
            Self::U32(v) => v as i64,
            Self::I64(v) => v,
            Self::U64(v) => v as i64,
            Self::F32(v) => v as i64,
            Self::F64(v) => v as i64,
            Self::Address(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
            other => other.as_i64() as f64,
        }
    }

    #[inline]
    pub fn as_address(self) -> usize {
        match self {
            Self::Address(v) => v,
            other => other.as_i64() as u64 as usize,
        }
    }

    /// Raw 64-bit slot encoding used by closure trampolines
    pub fn to_bits(self) -> u64 {
        match self {
            Self::F32(v) => v.to_bits() as u64,
            Self::F64(v) => v.to_bits(),
            Self::Address(v) => v as u64,
            other => other.as_i64() as u64,
        }
    }

    /// Decode a raw 64-bit slot as `ty`; upper bits beyond the width are ignored
    pub fn from_bits(ty: NativeType, bits: u64, platform: &Platform) -> Self {
        match ty {
            NativeType::Float => Self::F32(f32::from_bits(bits as u32)),
            NativeType::Double => Self::F64(f64::from_bits(bits)),
            _ => Self::from_i64(ty, bits as i64, platform),
        }
    }
}
