//! Declared (managed-side) types and signature types

use super::alias::{Modifiers, TypeAlias};
use super::enums::EnumType;
use super::native::NativeType;
use crate::runtime::{CallingConvention, Platform};
use std::fmt;
use std::sync::Arc;

/// Managed primitive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    /// Native type used when no alias overrides the width
    pub const fn default_native(self) -> NativeType {
        match self {
            Self::Bool => NativeType::SInt,
            Self::Byte => NativeType::SChar,
            Self::Short => NativeType::SShort,
            Self::Int => NativeType::SInt,
            Self::Long => NativeType::SLongLong,
            Self::Float => NativeType::Float,
            Self::Double => NativeType::Double,
        }
    }

    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Byte => "i8",
            Self::Short => "i16",
            Self::Int => "i32",
            Self::Long => "i64",
            Self::Float => "f32",
            Self::Double => "f64",
        }
    }
}

/// The in-process type declared at a signature position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Void,
    Primitive(Primitive),
    /// Nullable primitive
    Boxed(Primitive),
    /// Integer with the width of the platform's C `long`
    NativeLong,
    Pointer,
    String,
    CharSequence,
    /// Growable string buffer, exclusively owned by the caller
    StringBuilder,
    /// Growable string buffer shared with other holders
    StringBuffer,
    Enum(Arc<EnumType>),
    EnumSet(Arc<EnumType>),
    /// Aggregate passed by reference, named by its declaration
    Struct(Arc<str>),
    Callback(Arc<CallbackSignature>),
    /// Scalar passed through a pointer to scratch memory
    ByReference(Box<DeclaredType>),
    Array(Box<DeclaredType>),
}

impl DeclaredType {
    pub fn structure(name: &str) -> Self {
        Self::Struct(Arc::from(name))
    }

    pub fn array_of(element: DeclaredType) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn by_reference(referent: DeclaredType) -> Self {
        Self::ByReference(Box::new(referent))
    }

    pub fn callback(signature: CallbackSignature) -> Self {
        Self::Callback(Arc::new(signature))
    }

    /// Array element type, if this is an array
    pub fn element(&self) -> Option<&DeclaredType> {
        match self {
            Self::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_char_sequence(&self) -> bool {
        matches!(self, Self::String | Self::CharSequence)
    }

    /// Types whose value is an integer and may therefore carry a width alias
    pub fn accepts_width_alias(&self) -> bool {
        match self {
            Self::Primitive(p) | Self::Boxed(p) => p.is_integer(),
            Self::NativeLong | Self::Enum(_) | Self::EnumSet(_) => true,
            Self::ByReference(inner) | Self::Array(inner) => inner.accepts_width_alias(),
            _ => false,
        }
    }

    /// Default native type, before alias overrides
    pub fn default_native(&self) -> NativeType {
        match self {
            Self::Void => NativeType::Void,
            Self::Primitive(p) | Self::Boxed(p) => p.default_native(),
            Self::NativeLong => NativeType::SLong,
            Self::Enum(_) => NativeType::SInt,
            Self::EnumSet(ty) if ty.requires_wide_mask() => NativeType::SLongLong,
            Self::EnumSet(_) => NativeType::SInt,
            _ => NativeType::Address,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Boxed(p) => write!(f, "Option<{}>", p.name()),
            Self::NativeLong => f.write_str("native long"),
            Self::Pointer => f.write_str("pointer"),
            Self::String => f.write_str("string"),
            Self::CharSequence => f.write_str("char sequence"),
            Self::StringBuilder => f.write_str("string builder"),
            Self::StringBuffer => f.write_str("string buffer"),
            Self::Enum(ty) => write!(f, "enum {}", ty.name()),
            Self::EnumSet(ty) => write!(f, "set<{}>", ty.name()),
            Self::Struct(name) => write!(f, "struct {}", name),
            Self::Callback(sig) => write!(f, "callback {}", sig),
            Self::ByReference(inner) => write!(f, "&mut {}", inner),
            Self::Array(element) => write!(f, "{}[]", element),
        }
    }
}

/// A declared type plus its modifier metadata. Immutable; used as the
/// resolver's cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureType {
    declared: DeclaredType,
    modifiers: Modifiers,
}

impl SignatureType {
    pub fn new(declared: DeclaredType, modifiers: Modifiers) -> Self {
        Self { declared, modifiers }
    }

    pub fn plain(declared: DeclaredType) -> Self {
        Self::new(declared, Modifiers::none())
    }

    #[inline]
    pub fn declared(&self) -> &DeclaredType {
        &self.declared
    }

    #[inline]
    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    /// The single width alias, if present
    pub fn alias(&self) -> Option<TypeAlias> {
        self.modifiers.aliases().first().copied()
    }

    /// Effective native type of the value (or array element) on `platform`
    pub fn effective_native(&self, default: NativeType, platform: &Platform) -> NativeType {
        self.alias()
            .map(|alias| alias.native_type(platform))
            .unwrap_or(default)
    }
}

impl From<DeclaredType> for SignatureType {
    fn from(declared: DeclaredType) -> Self {
        Self::plain(declared)
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.modifiers, self.declared)
    }
}

/// Signature of a managed callable exposed to (or received from) native code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackSignature {
    params: Vec<SignatureType>,
    result: SignatureType,
    convention: CallingConvention,
}

impl CallbackSignature {
    pub fn new(params: Vec<SignatureType>, result: SignatureType) -> Self {
        Self {
            params,
            result,
            convention: CallingConvention::default(),
        }
    }

    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }

    #[inline]
    pub fn params(&self) -> &[SignatureType] {
        &self.params
    }

    #[inline]
    pub fn result(&self) -> &SignatureType {
        &self.result
    }

    #[inline]
    pub fn convention(&self) -> CallingConvention {
        self.convention
    }
}

impl fmt::Display for CallbackSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.result)
    }
}
