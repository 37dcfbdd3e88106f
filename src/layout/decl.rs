//! Aggregate declarations - the ordered field lists layouts are computed from

use crate::types::{NativeType, TypeAlias};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// Fields laid out one after another
    Struct,
    /// Every field at offset 0
    Union,
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Struct => "struct",
            Self::Union => "union",
        })
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(NativeType),
    /// Scalar whose width comes from a typedef (`u_int8_t`, `size_t`, ...)
    Alias(TypeAlias),
    /// Untyped address
    Pointer,
    /// Aggregate embedded by value
    Inner(String),
    /// Pointer to a separately addressed aggregate
    Reference(String),
    Array { element: Box<FieldType>, len: usize },
    /// Fixed-capacity NUL-terminated character buffer
    String { len: usize },
}

impl FieldType {
    pub fn inner(name: impl Into<String>) -> Self {
        Self::Inner(name.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference(name.into())
    }

    pub fn array(element: FieldType, len: usize) -> Self {
        Self::Array {
            element: Box::new(element),
            len,
        }
    }
}

impl From<NativeType> for FieldType {
    fn from(ty: NativeType) -> Self {
        Self::Scalar(ty)
    }
}

impl From<TypeAlias> for FieldType {
    fn from(alias: TypeAlias) -> Self {
        Self::Alias(alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDecl {
    pub name: String,
    pub ty: FieldType,
}

/// A struct or union declaration.
///
/// ```
/// use nativecall::layout::AggregateDecl;
/// use nativecall::types::{NativeType, TypeAlias};
///
/// let decl = AggregateDecl::structure("point")
///     .field("x", NativeType::SInt)
///     .field("y", NativeType::SInt)
///     .field("tag", TypeAlias::UInt8);
/// assert_eq!(decl.fields().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateDecl {
    name: String,
    kind: AggregateKind,
    packing: Option<usize>,
    fields: Vec<FieldDecl>,
}

impl AggregateDecl {
    pub fn new(name: impl Into<String>, kind: AggregateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            packing: None,
            fields: Vec::new(),
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, AggregateKind::Struct)
    }

    pub fn union(name: impl Into<String>) -> Self {
        Self::new(name, AggregateKind::Union)
    }

    /// Cap every field's alignment at `packing` bytes (`#pragma pack(n)`)
    pub fn packed(mut self, packing: usize) -> Self {
        self.packing = Some(packing);
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    #[inline]
    pub fn packing(&self) -> Option<usize> {
        self.packing
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Checks that do not need other declarations
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("aggregate has no fields".into());
        }
        if let Some(packing) = self.packing {
            if !packing.is_power_of_two() {
                return Err(format!("packing {} is not a power of two", packing));
            }
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(format!("duplicate field '{}'", field.name));
            }
            validate_type(&field.name, &field.ty, false)?;
        }
        Ok(())
    }
}

fn validate_type(field: &str, ty: &FieldType, in_array: bool) -> Result<(), String> {
    match ty {
        FieldType::Scalar(NativeType::Void) => Err(format!("field '{}' has type void", field)),
        FieldType::Array { len: 0, .. } | FieldType::String { len: 0 } => {
            Err(format!("field '{}' has zero length", field))
        }
        FieldType::Array { .. } | FieldType::String { .. } if in_array => {
            Err(format!("field '{}' nests arrays", field))
        }
        FieldType::Array { element, .. } => validate_type(field, element, true),
        _ => Ok(()),
    }
}
