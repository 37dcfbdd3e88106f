//! Enum and enum-set descriptors.
//!
//! Constants carry explicit integer values; a set of constants marshals as
//! the bitwise OR of their values.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    constants: Vec<(String, i64)>,
}

impl EnumType {
    pub fn new<N, I>(name: impl Into<String>, constants: I) -> Arc<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, i64)>,
    {
        Arc::new(Self {
            name: name.into(),
            constants: constants
                .into_iter()
                .map(|(constant, value)| (constant.into(), value))
                .collect(),
        })
    }

    /// Constants valued by declaration order
    pub fn ordinal<N, I>(name: impl Into<String>, constants: I) -> Arc<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = N>,
    {
        Self::new(
            name,
            constants
                .into_iter()
                .enumerate()
                .map(|(i, constant)| (constant, i as i64)),
        )
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Look up a constant by name
    pub fn constant(self: &Arc<Self>, name: &str) -> Option<EnumValue> {
        let index = self.constants.iter().position(|(n, _)| n == name)?;
        Some(EnumValue {
            ty: Arc::clone(self),
            index,
        })
    }

    /// Look up the first constant with the given native value
    pub fn from_value(self: &Arc<Self>, value: i64) -> Option<EnumValue> {
        let index = self.constants.iter().position(|(_, v)| *v == value)?;
        Some(EnumValue {
            ty: Arc::clone(self),
            index,
        })
    }

    /// Whether a set mask needs more than 32 bits
    pub fn requires_wide_mask(&self) -> bool {
        self.constants
            .iter()
            .any(|(_, v)| (*v as u64) > u32::MAX as u64)
    }

    fn value_at(&self, index: usize) -> i64 {
        self.constants[index].1
    }

    fn name_at(&self, index: usize) -> &str {
        &self.constants[index].0
    }
}

/// One constant of an enum type
#[derive(Debug, Clone)]
pub struct EnumValue {
    ty: Arc<EnumType>,
    index: usize,
}

impl EnumValue {
    #[inline]
    pub fn enum_type(&self) -> &Arc<EnumType> {
        &self.ty
    }

    pub fn name(&self) -> &str {
        self.ty.name_at(self.index)
    }

    pub fn value(&self) -> i64 {
        self.ty.value_at(self.index)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && (Arc::ptr_eq(&self.ty, &other.ty) || self.ty == other.ty)
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.ty.name(), self.name())
    }
}

/// A set of constants of one enum type
#[derive(Debug, Clone)]
pub struct EnumSetValue {
    ty: Arc<EnumType>,
    members: BTreeSet<usize>,
}

impl EnumSetValue {
    pub fn empty(ty: &Arc<EnumType>) -> Self {
        Self {
            ty: Arc::clone(ty),
            members: BTreeSet::new(),
        }
    }

    /// Build a set from constant names; unknown names yield `None`
    pub fn of<'a>(ty: &Arc<EnumType>, names: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut set = Self::empty(ty);
        for name in names {
            let constant = ty.constant(name)?;
            set.members.insert(constant.index);
        }
        Some(set)
    }

    /// Every constant whose bits are all present in `mask`.
    /// Zero-valued constants are members only of an empty mask.
    pub fn from_mask(ty: &Arc<EnumType>, mask: i64) -> Self {
        let members = ty
            .constants
            .iter()
            .enumerate()
            .filter(|(_, (_, v))| if *v == 0 { mask == 0 } else { mask & v == *v })
            .map(|(i, _)| i)
            .collect();
        Self {
            ty: Arc::clone(ty),
            members,
        }
    }

    #[inline]
    pub fn enum_type(&self) -> &Arc<EnumType> {
        &self.ty
    }

    pub fn mask(&self) -> i64 {
        self.members
            .iter()
            .fold(0, |mask, &i| mask | self.ty.value_at(i))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|&i| self.ty.name_at(i) == name)
    }

    pub fn insert(&mut self, constant: &EnumValue) {
        self.members.insert(constant.index);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|&i| self.ty.name_at(i))
    }
}

impl PartialEq for EnumSetValue {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members && *self.ty == *other.ty
    }
}
