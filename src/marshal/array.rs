//! Array parameters
//!
//! Every converter copies the managed elements into one flat scratch
//! buffer and passes its address. Direction is fixed when the converter is
//! built: `Out` skips the copy-in (the buffer starts zeroed), `In` never
//! copies native-side writes back.

use super::scalar::primitive_value;
use super::{NativeArg, ToNativeContext, ToNativeConverter};
use crate::error::MarshalError;
use crate::layout::StructLayout;
use crate::memory::{Memory, Pointer};
use crate::types::{Direction, NativeType, NativeValue, Primitive, Value};
use std::sync::Arc;

/// Managed element kind of a scalar array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayElement {
    Primitive(Primitive),
    NativeLong,
}

impl ArrayElement {
    fn managed(self, native: NativeValue) -> Value {
        match self {
            Self::Primitive(p) => primitive_value(p, native),
            Self::NativeLong => Value::NativeLong(native.as_i64()),
        }
    }
}

fn elements<'v>(value: &'v Value, expected: &str) -> Result<Option<&'v [Value]>, MarshalError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => Ok(Some(items)),
        other => Err(other.mismatch(expected)),
    }
}

fn elements_mut<'v>(value: &'v mut Value) -> Option<&'v mut Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Primitive or boxed scalar array with a fixed native element type.
///
/// Boxed arrays unbox into the scratch buffer (null elements become 0) and
/// rebox element by element on copy-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarArrayConverter {
    element: ArrayElement,
    native: NativeType,
    boxed: bool,
    direction: Direction,
}

impl ScalarArrayConverter {
    pub fn new(element: ArrayElement, native: NativeType, boxed: bool, direction: Direction) -> Self {
        Self {
            element,
            native,
            boxed,
            direction,
        }
    }

    #[inline]
    pub fn element_type(&self) -> NativeType {
        self.native
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn describe(&self) -> String {
        format!("{:?}[] ({})", self.element, self.native)
    }
}

impl ToNativeConverter for ScalarArrayConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let Some(items) = elements(value, &self.describe())? else {
            return Ok(NativeArg::null());
        };

        let platform = ctx.platform();
        let stride = self.native.size(platform);
        let memory = Memory::allocate_for_call(stride * items.len())?;

        if self.direction.copies_in() {
            let base = memory.pointer();
            for (i, item) in items.iter().enumerate() {
                let native = match item {
                    Value::Null if self.boxed => NativeValue::zero(self.native, platform),
                    item => item.to_native_scalar(self.native, platform)?,
                };
                unsafe { base.put(i * stride, self.native, native, platform) };
            }
        }
        Ok(NativeArg::buffer(memory))
    }

    fn post_invoke(&self, value: &mut Value, arg: &NativeArg, ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        if !self.direction.copies_out() {
            return Ok(());
        }
        let (Some(items), Some(memory)) = (elements_mut(value), arg.primary()) else {
            return Ok(());
        };

        let platform = ctx.platform();
        let stride = self.native.size(platform);
        let base = memory.pointer();
        for (i, item) in items.iter_mut().enumerate() {
            let native = unsafe { base.get(i * stride, self.native, platform) };
            *item = self.element.managed(native);
        }
        Ok(())
    }

    fn needs_post_invoke(&self) -> bool {
        self.direction.copies_out()
    }
}

/// Array of addresses in slots of the platform's pointer width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerArrayConverter {
    width: usize,
    direction: Direction,
}

impl PointerArrayConverter {
    pub fn new(width: usize, direction: Direction) -> Self {
        // slots are 4 or 8 bytes wide, see `slot`
        let width = if width == 4 { 4 } else { 8 };
        Self { width, direction }
    }

    fn slot(&self) -> NativeType {
        if self.width == 4 {
            NativeType::UInt
        } else {
            NativeType::ULongLong
        }
    }
}

impl ToNativeConverter for PointerArrayConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let Some(items) = elements(value, "pointer[]")? else {
            return Ok(NativeArg::null());
        };

        let memory = Memory::allocate_for_call(self.width * items.len())?;
        if self.direction.copies_in() {
            let base = memory.pointer();
            for (i, item) in items.iter().enumerate() {
                let address = match item {
                    Value::Null => 0,
                    Value::Address(a) => *a,
                    Value::Struct(s) => s.address(),
                    other => return Err(other.mismatch("pointer")),
                };
                unsafe {
                    base.put(
                        i * self.width,
                        self.slot(),
                        NativeValue::Address(address),
                        ctx.platform(),
                    )
                };
            }
        }
        Ok(NativeArg::buffer(memory))
    }

    fn post_invoke(&self, value: &mut Value, arg: &NativeArg, ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        if !self.direction.copies_out() {
            return Ok(());
        }
        let (Some(items), Some(memory)) = (elements_mut(value), arg.primary()) else {
            return Ok(());
        };

        let base = memory.pointer();
        for (i, item) in items.iter_mut().enumerate() {
            let address = unsafe { base.get(i * self.width, self.slot(), ctx.platform()) }.as_address();
            *item = match address {
                0 => Value::Null,
                address => Value::Address(address),
            };
        }
        Ok(())
    }

    fn needs_post_invoke(&self) -> bool {
        self.direction.copies_out()
    }
}

/// Array of aggregates marshalled as one contiguous block of
/// `len * size` bytes
#[derive(Debug, Clone)]
pub struct StructArrayConverter {
    layout: Arc<StructLayout>,
    direction: Direction,
}

impl StructArrayConverter {
    pub fn new(layout: Arc<StructLayout>, direction: Direction) -> Self {
        Self { layout, direction }
    }
}

impl ToNativeConverter for StructArrayConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, _ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let expected = format!("struct {}[]", self.layout.name());
        let Some(items) = elements(value, &expected)? else {
            return Ok(NativeArg::null());
        };

        let size = self.layout.size();
        let memory = Memory::allocate_for_call(size * items.len())?;
        let base = memory.pointer();
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::Struct(s) if s.layout().name() == self.layout.name() => {
                    if self.direction.copies_in() {
                        unsafe { s.store_to(base.offset(i * size)) };
                    }
                }
                Value::Null => {}
                other => return Err(other.mismatch(format!("struct {}", self.layout.name()))),
            }
        }
        Ok(NativeArg::buffer(memory))
    }

    fn post_invoke(&self, value: &mut Value, arg: &NativeArg, _ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        if !self.direction.copies_out() {
            return Ok(());
        }
        let (Some(items), Some(memory)) = (elements_mut(value), arg.primary()) else {
            return Ok(());
        };

        let size = self.layout.size();
        for (i, item) in items.iter().enumerate() {
            if let Value::Struct(s) = item {
                unsafe { s.load_from(memory.pointer().offset(i * size)) };
            }
        }
        Ok(())
    }

    fn needs_post_invoke(&self) -> bool {
        self.direction.copies_out()
    }
}

/// `char*[]`: one NUL-terminated buffer per element, passed as a flat
/// array of their addresses followed by a null slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringArrayConverter {
    direction: Direction,
}

impl StringArrayConverter {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }
}

impl ToNativeConverter for StringArrayConverter {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        let Some(items) = elements(value, "string[]")? else {
            return Ok(NativeArg::null());
        };

        let platform = ctx.platform();
        let width = platform.address_size;
        let mut arg = NativeArg::buffer(Memory::allocate_for_call(width * (items.len() + 1))?);
        let base = arg.primary().map(Memory::pointer).unwrap_or(Pointer::NULL);

        if self.direction.copies_in() {
            for (i, item) in items.iter().enumerate() {
                let address = match item {
                    Value::Null => 0,
                    Value::String(s) => {
                        let bytes = ctx.encoding().encode(s)?;
                        let element = Memory::from_bytes(&bytes, 1)?;
                        let address = element.address();
                        arg.keep(element);
                        address
                    }
                    other => return Err(other.mismatch("string")),
                };
                unsafe { base.put_address(i * width, address, platform) };
            }
        }
        Ok(arg)
    }

    fn post_invoke(&self, value: &mut Value, arg: &NativeArg, ctx: &ToNativeContext<'_>) -> Result<(), MarshalError> {
        if !self.direction.copies_out() {
            return Ok(());
        }
        let (Some(items), Some(memory)) = (elements_mut(value), arg.primary()) else {
            return Ok(());
        };

        let platform = ctx.platform();
        let base = memory.pointer();
        for (i, item) in items.iter_mut().enumerate() {
            let address = unsafe { base.get_address(i * platform.address_size, platform) };
            *item = match address {
                0 => Value::Null,
                address => Value::String(unsafe { Pointer::new(address).get_string(0, None, ctx.encoding())? }),
            };
        }
        Ok(())
    }

    fn needs_post_invoke(&self) -> bool {
        self.direction.copies_out()
    }
}
