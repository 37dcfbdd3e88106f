//! Modifier vocabulary: width aliases, platform-size aliases and
//! reference-direction flags attached to a parameter or field.

use super::native::NativeType;
use crate::runtime::Platform;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::BitOr;

/// C typedef that pins the native width (and signedness) of an integer value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeAlias {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    /// `long`, platform sized
    Long,
    /// `unsigned long`, platform sized
    ULong,
    /// `size_t`, address sized
    Size,
    /// `ssize_t`, address sized
    SSize,
    IntPtr,
    UIntPtr,
}

impl TypeAlias {
    /// Native type this alias stands for on `platform`
    pub const fn native_type(self, platform: &Platform) -> NativeType {
        let wide = platform.address_size == 8;
        match self {
            Self::Int8 => NativeType::SChar,
            Self::UInt8 => NativeType::UChar,
            Self::Int16 => NativeType::SShort,
            Self::UInt16 => NativeType::UShort,
            Self::Int32 => NativeType::SInt,
            Self::UInt32 => NativeType::UInt,
            Self::Int64 => NativeType::SLongLong,
            Self::UInt64 => NativeType::ULongLong,
            Self::Long => NativeType::SLong,
            Self::ULong => NativeType::ULong,
            Self::Size | Self::UIntPtr if wide => NativeType::ULongLong,
            Self::Size | Self::UIntPtr => NativeType::UInt,
            Self::SSize | Self::IntPtr if wide => NativeType::SLongLong,
            Self::SSize | Self::IntPtr => NativeType::SInt,
        }
    }

    /// Whether the width follows the active runtime rather than being fixed
    pub const fn is_platform_sized(self) -> bool {
        matches!(
            self,
            Self::Long | Self::ULong | Self::Size | Self::SSize | Self::IntPtr | Self::UIntPtr
        )
    }

    pub const fn c_name(self) -> &'static str {
        match self {
            Self::Int8 => "int8_t",
            Self::UInt8 => "u_int8_t",
            Self::Int16 => "int16_t",
            Self::UInt16 => "u_int16_t",
            Self::Int32 => "int32_t",
            Self::UInt32 => "u_int32_t",
            Self::Int64 => "int64_t",
            Self::UInt64 => "u_int64_t",
            Self::Long => "long",
            Self::ULong => "u_long",
            Self::Size => "size_t",
            Self::SSize => "ssize_t",
            Self::IntPtr => "intptr_t",
            Self::UIntPtr => "uintptr_t",
        }
    }

    /// Parse a C typedef name (`uint8_t` and `u_int8_t` spellings both accepted)
    pub fn from_c_name(name: &str) -> Option<Self> {
        let alias = match name {
            "int8_t" => Self::Int8,
            "uint8_t" | "u_int8_t" => Self::UInt8,
            "int16_t" => Self::Int16,
            "uint16_t" | "u_int16_t" => Self::UInt16,
            "int32_t" => Self::Int32,
            "uint32_t" | "u_int32_t" => Self::UInt32,
            "int64_t" => Self::Int64,
            "uint64_t" | "u_int64_t" => Self::UInt64,
            "long" => Self::Long,
            "ulong" | "u_long" | "unsigned long" => Self::ULong,
            "size_t" => Self::Size,
            "ssize_t" => Self::SSize,
            "intptr_t" => Self::IntPtr,
            "uintptr_t" => Self::UIntPtr,
            _ => return None,
        };
        Some(alias)
    }
}

impl fmt::Display for TypeAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// Parameter flags (bit set)
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParameterFlags(pub u8);

impl ParameterFlags {
    pub const NONE: Self = ParameterFlags(0);
    /// Native code reads the data
    pub const IN: Self = ParameterFlags(0x01);
    /// Native code writes the data; copy back after the call
    pub const OUT: Self = ParameterFlags(0x02);
    pub const PINNED: Self = ParameterFlags(0x04);
    pub const NUL_TERMINATE: Self = ParameterFlags(0x08);
    pub const TRANSIENT: Self = ParameterFlags(0x10);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        ParameterFlags(self.0 | other.0)
    }

    /// Explicit direction, if any direction flag is set
    pub const fn direction(self) -> Option<Direction> {
        match (self.contains(Self::IN), self.contains(Self::OUT)) {
            (true, true) => Some(Direction::InOut),
            (true, false) => Some(Direction::In),
            (false, true) => Some(Direction::Out),
            (false, false) => None,
        }
    }
}

impl BitOr for ParameterFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Copy direction of an array or buffer parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
    #[serde(rename = "in-out")]
    InOut,
}

impl Direction {
    /// Managed contents are copied into native memory before the call
    #[inline]
    pub const fn copies_in(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Native memory is copied back into the managed value after the call
    #[inline]
    pub const fn copies_out(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "in",
            Self::Out => "out",
            Self::InOut => "in-out",
        })
    }
}

/// Modifier metadata attached to a signature position.
///
/// Aliases are kept sorted and de-duplicated so equal modifier sets hash
/// equally; conflicting aliases are rejected by the resolver, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    aliases: SmallVec<[TypeAlias; 1]>,
    flags: ParameterFlags,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: TypeAlias) -> Self {
        if let Err(pos) = self.aliases.binary_search(&alias) {
            self.aliases.insert(pos, alias);
        }
        self
    }

    pub fn flags(mut self, flags: ParameterFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    pub fn input(self) -> Self {
        self.flags(ParameterFlags::IN)
    }

    pub fn output(self) -> Self {
        self.flags(ParameterFlags::OUT)
    }

    #[inline]
    pub fn aliases(&self) -> &[TypeAlias] {
        &self.aliases
    }

    #[inline]
    pub fn parameter_flags(&self) -> ParameterFlags {
        self.flags
    }

    /// Explicit direction from the flags, falling back to `default`
    pub fn direction_or(&self, default: Direction) -> Direction {
        self.flags.direction().unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.flags == ParameterFlags::NONE
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for alias in &self.aliases {
            write!(f, "@{} ", alias)?;
        }
        if let Some(direction) = self.flags.direction() {
            write!(f, "@{} ", direction)?;
        }
        Ok(())
    }
}
