//! Layout computation
//!
//! Offsets follow the C rules for the runtime's platform: each field is
//! placed at the next multiple of its alignment, a struct's size is rounded
//! up to its widest alignment, union members all start at 0.

use super::decl::{AggregateDecl, AggregateKind, FieldType};
use crate::error::LayoutError;
use crate::runtime::Platform;
use crate::types::NativeType;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Computed layout of one aggregate
#[derive(Debug, PartialEq, Eq)]
pub struct StructLayout {
    name: String,
    kind: AggregateKind,
    size: usize,
    alignment: usize,
    fields: Vec<FieldLayout>,
    index: HashMap<String, usize>,
}

impl StructLayout {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Fields in declaration order
    #[inline]
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Result<&FieldLayout, LayoutError> {
        self.index
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| LayoutError::UnknownField {
                aggregate: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn offset_of(&self, name: &str) -> Result<usize, LayoutError> {
        self.field(name).map(|f| f.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub alignment: usize,
    pub kind: FieldKind,
}

/// Resolved field kind; embedded aggregates carry their own layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(NativeType),
    Pointer,
    Inner(Arc<StructLayout>),
    /// Name of the referenced aggregate; its layout is looked up on access
    Reference(String),
    Array {
        element: Box<FieldKind>,
        stride: usize,
        len: usize,
    },
    String { len: usize },
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Pointer => "pointer",
            Self::Inner(_) => "embedded aggregate",
            Self::Reference(_) => "aggregate reference",
            Self::Array { .. } => "array",
            Self::String { .. } => "string",
        }
    }
}

/// Declarations and memoized layouts for one platform.
///
/// Layouts are computed on first request and never evicted. Concurrent
/// first requests may compute the same layout twice; the first insert wins.
pub struct StructLayoutEngine {
    platform: Platform,
    decls: DashMap<String, Arc<AggregateDecl>>,
    layouts: DashMap<String, Arc<StructLayout>>,
}

impl StructLayoutEngine {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            decls: DashMap::new(),
            layouts: DashMap::new(),
        }
    }

    #[inline]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Register a declaration. Re-declaring an identical aggregate is a
    /// no-op; a different declaration under a known name is rejected.
    pub fn declare(&self, decl: AggregateDecl) -> Result<(), LayoutError> {
        decl.validate()
            .map_err(|reason| LayoutError::InvalidDeclaration {
                name: decl.name().to_string(),
                reason,
            })?;

        let name = decl.name().to_string();
        let existing = self
            .decls
            .entry(name.clone())
            .or_insert_with(|| Arc::new(decl.clone()))
            .clone();

        if *existing != decl {
            return Err(LayoutError::InvalidDeclaration {
                name,
                reason: "already declared with different fields".into(),
            });
        }
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    /// Layout of a declared aggregate
    pub fn layout(&self, name: &str) -> Result<Arc<StructLayout>, LayoutError> {
        if let Some(layout) = self.layouts.get(name) {
            return Ok(Arc::clone(&layout));
        }
        let _perf = crate::logging::perf::track("layout");
        self.compute(name, &mut Vec::new())
    }

    fn compute(&self, name: &str, stack: &mut Vec<String>) -> Result<Arc<StructLayout>, LayoutError> {
        if let Some(layout) = self.layouts.get(name) {
            return Ok(Arc::clone(&layout));
        }

        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut chain = stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(LayoutError::RecursiveEmbedding { chain });
        }

        let decl = self
            .decls
            .get(name)
            .map(|d| Arc::clone(&d))
            .ok_or_else(|| LayoutError::UnknownAggregate {
                name: name.to_string(),
            })?;

        self.platform
            .validate()
            .map_err(|reason| LayoutError::InvalidDeclaration {
                name: name.to_string(),
                reason,
            })?;

        stack.push(name.to_string());
        let result = self.place_fields(&decl, stack);
        stack.pop();
        let layout = result?;

        crate::logging::log_layout_computed(&layout.name, layout.size, layout.alignment, layout.fields.len());

        let layout = self
            .layouts
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(layout))
            .clone();
        Ok(layout)
    }

    fn place_fields(&self, decl: &AggregateDecl, stack: &mut Vec<String>) -> Result<StructLayout, LayoutError> {
        let mut fields = Vec::with_capacity(decl.fields().len());
        let mut index = HashMap::with_capacity(decl.fields().len());
        let mut offset = 0usize;
        let mut size = 0usize;
        let mut alignment = 1usize;
        let overflow = || LayoutError::InvalidDeclaration {
            name: decl.name().to_string(),
            reason: "size overflows".into(),
        };

        for field in decl.fields() {
            let (field_size, field_align, kind) = self
                .place(&field.ty, stack)?
                .ok_or_else(overflow)?;
            let field_align = match decl.packing() {
                Some(packing) => field_align.min(packing),
                None => field_align,
            };

            let field_offset = match decl.kind() {
                AggregateKind::Struct => {
                    let at = checked_align_up(offset, field_align).ok_or_else(overflow)?;
                    offset = at.checked_add(field_size).ok_or_else(overflow)?;
                    size = offset;
                    at
                }
                AggregateKind::Union => {
                    size = size.max(field_size);
                    0
                }
            };
            alignment = alignment.max(field_align);

            index.insert(field.name.clone(), fields.len());
            fields.push(FieldLayout {
                name: field.name.clone(),
                offset: field_offset,
                size: field_size,
                alignment: field_align,
                kind,
            });
        }

        // allocations are limited to isize::MAX bytes
        let size = checked_align_up(size, alignment)
            .filter(|&size| size <= isize::MAX as usize)
            .ok_or_else(overflow)?;

        Ok(StructLayout {
            name: decl.name().to_string(),
            kind: decl.kind(),
            size,
            alignment,
            fields,
            index,
        })
    }

    /// (size, alignment, kind) of one field type; `None` when the size
    /// does not fit in `usize`
    fn place(
        &self,
        ty: &FieldType,
        stack: &mut Vec<String>,
    ) -> Result<Option<(usize, usize, FieldKind)>, LayoutError> {
        let platform = &self.platform;
        let placed = match ty {
            FieldType::Scalar(native) => (native.size(platform), native.align(platform), FieldKind::Scalar(*native)),
            FieldType::Alias(alias) => {
                let native = alias.native_type(platform);
                (native.size(platform), native.align(platform), FieldKind::Scalar(native))
            }
            FieldType::Pointer => address_slot(platform, FieldKind::Pointer),
            FieldType::Reference(target) => {
                if !self.is_declared(target) {
                    return Err(LayoutError::UnknownAggregate { name: target.clone() });
                }
                address_slot(platform, FieldKind::Reference(target.clone()))
            }
            FieldType::Inner(child) => {
                let layout = self.compute(child, stack)?;
                (layout.size, layout.alignment, FieldKind::Inner(layout))
            }
            FieldType::Array { element, len } => {
                let Some((stride, align, element)) = self.place(element, stack)? else {
                    return Ok(None);
                };
                let Some(size) = stride.checked_mul(*len) else {
                    return Ok(None);
                };
                (
                    size,
                    align,
                    FieldKind::Array {
                        element: Box::new(element),
                        stride,
                        len: *len,
                    },
                )
            }
            FieldType::String { len } => (*len, 1, FieldKind::String { len: *len }),
        };
        Ok(Some(placed))
    }
}

fn address_slot(platform: &Platform, kind: FieldKind) -> (usize, usize, FieldKind) {
    (
        NativeType::Address.size(platform),
        NativeType::Address.align(platform),
        kind,
    )
}

/// `align_up` that reports overflow instead of wrapping
#[inline]
fn checked_align_up(offset: usize, align: usize) -> Option<usize> {
    offset.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Round `offset` up to a multiple of `align` (a power of two)
#[inline]
pub(crate) const fn align_up(offset: usize, align: usize) -> usize {
    (offset.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}
