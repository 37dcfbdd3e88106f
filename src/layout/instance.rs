//! Aggregate instances and field access
//!
//! Two kinds of child view, with different aliasing:
//! - `Struct::inner` returns a view at `parent base + offset` that shares the
//!   parent's memory (and keeps it alive).
//! - `Struct::reference` returns a `StructRef` bound to the pointer slot;
//!   every `get()` re-reads the slot and builds a new, non-owning view.
//!
//! Accessors are unsynchronized, as native memory is.

use super::compute::{FieldKind, FieldLayout, StructLayout};
use crate::error::{LayoutError, MarshalError};
use crate::memory::{Memory, Pointer};
use crate::runtime::Runtime;
use crate::types::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A view of native memory laid out as a declared aggregate
#[derive(Clone)]
pub struct Struct {
    runtime: Arc<Runtime>,
    layout: Arc<StructLayout>,
    base: Pointer,
    owner: Option<Arc<Memory>>,
    // Raw memory view: neither Send nor Sync
    _unsync: PhantomData<*const ()>,
}

impl Struct {
    /// Allocate a zeroed instance of the aggregate `name`
    pub fn new(runtime: &Arc<Runtime>, name: &str) -> Result<Self, MarshalError> {
        let layout = runtime.layout(name)?;
        let memory = Memory::allocate_for_call(layout.size())?;
        Ok(Self::view(
            Arc::clone(runtime),
            layout,
            memory.pointer(),
            Some(Arc::new(memory)),
        ))
    }

    /// View an existing native instance.
    ///
    /// # Safety
    /// `address` must point to at least `size(name)` bytes that stay valid
    /// while this view (or any view derived from it) is used.
    pub unsafe fn from_address(runtime: &Arc<Runtime>, name: &str, address: usize) -> Result<Self, LayoutError> {
        let layout = runtime.layout(name)?;
        Ok(Self::view(Arc::clone(runtime), layout, Pointer::new(address), None))
    }

    pub(crate) fn view(
        runtime: Arc<Runtime>,
        layout: Arc<StructLayout>,
        base: Pointer,
        owner: Option<Arc<Memory>>,
    ) -> Self {
        Self {
            runtime,
            layout,
            base,
            owner,
            _unsync: PhantomData,
        }
    }

    #[inline]
    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.base.address()
    }

    #[inline]
    pub fn pointer(&self) -> Pointer {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Whether this view keeps its memory alive (allocated here or embedded
    /// in an allocated parent)
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Accessor for a scalar, pointer or string field
    pub fn field(&self, name: &str) -> Result<FieldAccessor<'_>, LayoutError> {
        let field = self.layout.field(name)?;
        match field.kind {
            FieldKind::Scalar(_) | FieldKind::Pointer | FieldKind::String { .. } => Ok(FieldAccessor {
                owner: self,
                field,
            }),
            ref other => Err(kind_error(name, "scalar", other)),
        }
    }

    pub fn get(&self, name: &str) -> Result<Value, MarshalError> {
        self.field(name)?.get()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), MarshalError> {
        self.field(name)?.set(&value.into())
    }

    /// View of an embedded aggregate; shares this instance's memory
    pub fn inner(&self, name: &str) -> Result<Struct, LayoutError> {
        let field = self.layout.field(name)?;
        match &field.kind {
            FieldKind::Inner(layout) => Ok(self.child(layout, field.offset)),
            other => Err(kind_error(name, "embedded aggregate", other)),
        }
    }

    /// Handle on a pointer-to-aggregate field
    pub fn reference(&self, name: &str) -> Result<StructRef, LayoutError> {
        let field = self.layout.field(name)?;
        match &field.kind {
            FieldKind::Reference(target) => self.reference_at(target, field.offset),
            other => Err(kind_error(name, "aggregate reference", other)),
        }
    }

    /// Indexed access to a fixed-length array field
    pub fn array(&self, name: &str) -> Result<ArrayField<'_>, LayoutError> {
        let field = self.layout.field(name)?;
        match &field.kind {
            FieldKind::Array { element, stride, len } => Ok(ArrayField {
                owner: self,
                field,
                element,
                stride: *stride,
                len: *len,
            }),
            other => Err(kind_error(name, "array", other)),
        }
    }

    /// Zero-fill this instance's range
    pub fn reset(&self) {
        unsafe { self.base.zero(0, self.size()) }
    }

    /// Copy of the instance's bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        unsafe { self.base.bytes(0, self.size()) }
    }

    /// Overwrite the instance with `size()` bytes read from `src`.
    ///
    /// # Safety
    /// `src` must be readable for `size()` bytes and not overlap this instance.
    pub unsafe fn load_from(&self, src: Pointer) {
        self.base.copy_from(0, src, self.size())
    }

    /// Copy the instance into `dst`.
    ///
    /// # Safety
    /// `dst` must be writable for `size()` bytes and not overlap this instance.
    pub unsafe fn store_to(&self, dst: Pointer) {
        dst.copy_from(0, self.base, self.size())
    }

    fn child(&self, layout: &Arc<StructLayout>, offset: usize) -> Struct {
        Self::view(
            Arc::clone(&self.runtime),
            Arc::clone(layout),
            self.base.offset(offset),
            self.owner.clone(),
        )
    }

    fn reference_at(&self, target: &str, offset: usize) -> Result<StructRef, LayoutError> {
        Ok(StructRef {
            runtime: Arc::clone(&self.runtime),
            target: self.runtime.layout(target)?,
            slot: self.base.offset(offset),
            _owner: self.owner.clone(),
            _unsync: PhantomData,
        })
    }

    fn read(&self, offset: usize, kind: &FieldKind) -> Result<Value, MarshalError> {
        let platform = self.runtime.platform();
        let value = unsafe {
            match *kind {
                FieldKind::Scalar(ty) => Value::from_native_scalar(ty, self.base.get(offset, ty, platform)),
                FieldKind::Pointer => Value::Address(self.base.get_address(offset, platform)),
                FieldKind::String { len } => Value::String(self.base.get_string(
                    offset,
                    Some(len),
                    self.runtime.config().string_encoding,
                )?),
                ref other => return Err(kind_error("element", "scalar", other).into()),
            }
        };
        Ok(value)
    }

    fn write(&self, offset: usize, kind: &FieldKind, value: &Value) -> Result<(), MarshalError> {
        let platform = self.runtime.platform();
        match *kind {
            FieldKind::Scalar(ty) => {
                let native = value.to_native_scalar(ty, platform)?;
                unsafe { self.base.put(offset, ty, native, platform) }
            }
            FieldKind::Pointer => {
                let address = match value {
                    Value::Null => 0,
                    Value::Address(a) => *a,
                    Value::Struct(s) => s.address(),
                    other => return Err(other.mismatch("pointer")),
                };
                unsafe { self.base.put_address(offset, address, platform) }
            }
            FieldKind::String { len } => {
                let s = value.as_str().ok_or_else(|| value.mismatch("string"))?;
                unsafe { self.base.put_string(offset, len, s, self.runtime.config().string_encoding)? }
            }
            ref other => return Err(kind_error("element", "scalar", other).into()),
        }
        Ok(())
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Struct")
            .field("name", &self.layout.name())
            .field("address", &self.base)
            .field("owned", &self.is_owned())
            .finish()
    }
}

fn kind_error(field: &str, expected: &'static str, found: &FieldKind) -> LayoutError {
    LayoutError::FieldKind {
        field: field.to_string(),
        expected,
        found: found.describe(),
    }
}

/// Accessor bound to (base address, offset, width)
#[derive(Clone, Copy)]
pub struct FieldAccessor<'a> {
    owner: &'a Struct,
    field: &'a FieldLayout,
}

impl<'a> FieldAccessor<'a> {
    #[inline]
    pub fn name(&self) -> &'a str {
        &self.field.name
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.field.offset
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.field.size
    }

    pub fn address(&self) -> usize {
        self.owner.base.offset(self.field.offset).address()
    }

    pub fn get(&self) -> Result<Value, MarshalError> {
        self.owner.read(self.field.offset, &self.field.kind)
    }

    pub fn set(&self, value: &Value) -> Result<(), MarshalError> {
        self.owner.write(self.field.offset, &self.field.kind, value)
    }
}

impl fmt::Debug for FieldAccessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} @ +{}", self.owner.layout.name(), self.field.name, self.field.offset)
    }
}

/// Pointer-to-aggregate field.
///
/// Holds no view of its own: `get()` dereferences the slot each time, so
/// two views obtained before and after `set()` may see different memory.
pub struct StructRef {
    runtime: Arc<Runtime>,
    target: Arc<StructLayout>,
    slot: Pointer,
    _owner: Option<Arc<Memory>>,
    _unsync: PhantomData<*const ()>,
}

impl StructRef {
    /// Layout of the referenced aggregate
    #[inline]
    pub fn target(&self) -> &Arc<StructLayout> {
        &self.target
    }

    /// Address currently stored in the slot
    pub fn address(&self) -> usize {
        unsafe { self.slot.get_address(0, self.runtime.platform()) }
    }

    pub fn is_null(&self) -> bool {
        self.address() == 0
    }

    /// Fresh view of the current target, `None` when the slot is null
    pub fn get(&self) -> Option<Struct> {
        match self.address() {
            0 => None,
            address => Some(Struct::view(
                Arc::clone(&self.runtime),
                Arc::clone(&self.target),
                Pointer::new(address),
                None,
            )),
        }
    }

    /// Point the slot at `address`.
    ///
    /// # Safety
    /// `address` must be null or point to an instance of the target
    /// aggregate that outlives every view obtained through `get()`.
    pub unsafe fn set(&self, address: usize) {
        self.slot.put_address(0, address, self.runtime.platform())
    }

    pub fn set_null(&self) {
        unsafe { self.set(0) }
    }

    /// Zero-fill the bound target; a null slot is left alone
    pub fn reset(&self) {
        if let Some(target) = self.get() {
            target.reset();
        }
    }
}

impl fmt::Debug for StructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructRef<{}>({:#x})", self.target.name(), self.address())
    }
}

/// Fixed-length array field
#[derive(Clone, Copy)]
pub struct ArrayField<'a> {
    owner: &'a Struct,
    field: &'a FieldLayout,
    element: &'a FieldKind,
    stride: usize,
    len: usize,
}

impl<'a> ArrayField<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    fn offset_of(&self, index: usize) -> Result<usize, LayoutError> {
        if index >= self.len {
            return Err(LayoutError::IndexOutOfBounds {
                field: self.field.name.clone(),
                index,
                len: self.len,
            });
        }
        Ok(self.field.offset + index * self.stride)
    }

    pub fn get(&self, index: usize) -> Result<Value, MarshalError> {
        let offset = self.offset_of(index)?;
        self.owner.read(offset, self.element)
    }

    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<(), MarshalError> {
        let offset = self.offset_of(index)?;
        self.owner.write(offset, self.element, &value.into())
    }

    /// All elements, in order
    pub fn to_vec(&self) -> Result<Vec<Value>, MarshalError> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    /// Embedded aggregate element
    pub fn inner(&self, index: usize) -> Result<Struct, LayoutError> {
        let offset = self.offset_of(index)?;
        match self.element {
            FieldKind::Inner(layout) => Ok(self.owner.child(layout, offset)),
            other => Err(kind_error(&self.field.name, "embedded aggregate", other)),
        }
    }

    /// Aggregate reference element
    pub fn reference(&self, index: usize) -> Result<StructRef, LayoutError> {
        let offset = self.offset_of(index)?;
        match self.element {
            FieldKind::Reference(target) => self.owner.reference_at(target, offset),
            other => Err(kind_error(&self.field.name, "aggregate reference", other)),
        }
    }
}
