//! Native memory - owned scratch allocations and raw address views
//!
//! Design: `Memory` owns a zeroed block from the global allocator (struct
//! instances, array and string scratch buffers). `Pointer` is a plain
//! address with unchecked typed reads and writes; validity is the caller's
//! contract, as it is in native code.

use crate::config::StringEncoding;
use crate::error::MarshalError;
use crate::runtime::Platform;
use crate::types::{NativeType, NativeValue};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Alignment of every owned block; covers all scalar types
const BLOCK_ALIGN: usize = 16;

/// Owned, zero-initialized native memory block
pub struct Memory {
    start: NonNull<u8>,
    layout: Layout,
}

impl Memory {
    /// Allocate a zeroed block of `size` bytes (at least one byte is reserved
    /// so the address is always distinct and non-null)
    pub fn allocate(size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size.max(1), BLOCK_ALIGN).ok()?;

        let start = unsafe { alloc_zeroed(layout) };
        let start = NonNull::new(start)?;

        crate::logging::log_allocation(layout.size(), start.as_ptr());
        Some(Self { start, layout })
    }

    /// Allocate or report the failure as a marshalling error
    pub fn allocate_for_call(size: usize) -> Result<Self, MarshalError> {
        Self::allocate(size).ok_or(MarshalError::OutOfMemory { size })
    }

    /// Allocate and fill with `bytes` followed by `zero_tail` zero bytes
    pub fn from_bytes(bytes: &[u8], zero_tail: usize) -> Result<Self, MarshalError> {
        let memory = Self::allocate_for_call(bytes.len() + zero_tail)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), memory.start.as_ptr(), bytes.len());
        }
        Ok(memory)
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.start.as_ptr() as usize
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn pointer(&self) -> Pointer {
        Pointer::new(self.address())
    }

    /// Copy of the whole block
    pub fn to_vec(&self) -> Vec<u8> {
        unsafe { std::slice::from_raw_parts(self.start.as_ptr(), self.size()).to_vec() }
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        crate::logging::log_deallocation(self.layout.size(), self.start.as_ptr());
        unsafe {
            dealloc(self.start.as_ptr(), self.layout);
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memory({:#x}, {} bytes)", self.address(), self.size())
    }
}

// Safety: the block is plain bytes with no thread affinity; concurrent
// access through views is the caller's responsibility.
unsafe impl Send for Memory {}
unsafe impl Sync for Memory {}

/// Raw native address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Pointer(usize);

impl Pointer {
    pub const NULL: Pointer = Pointer(0);

    #[inline]
    pub const fn new(address: usize) -> Self {
        Self(address)
    }

    #[inline]
    pub const fn address(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn offset(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset))
    }

    #[inline]
    fn at<T>(self, offset: usize) -> *mut T {
        self.0.wrapping_add(offset) as *mut T
    }

    /// # Safety
    /// `self + offset .. + size_of::<T>()` must be readable.
    #[inline]
    pub unsafe fn read<T: Copy>(self, offset: usize) -> T {
        self.at::<T>(offset).read_unaligned()
    }

    /// # Safety
    /// `self + offset .. + size_of::<T>()` must be writable.
    #[inline]
    pub unsafe fn write<T: Copy>(self, offset: usize, value: T) {
        self.at::<T>(offset).write_unaligned(value)
    }

    /// Read a native value of type `ty`
    ///
    /// # Safety
    /// The range covered by `ty` at `offset` must be readable.
    pub unsafe fn get(self, offset: usize, ty: NativeType, platform: &Platform) -> NativeValue {
        match (ty, ty.size(platform)) {
            (NativeType::Void, _) => NativeValue::Void,
            (NativeType::Float, _) => NativeValue::F32(self.read(offset)),
            (NativeType::Double, _) => NativeValue::F64(self.read(offset)),
            (NativeType::Address, 1) => NativeValue::Address(self.read::<u8>(offset) as usize),
            (NativeType::Address, 2) => NativeValue::Address(self.read::<u16>(offset) as usize),
            (NativeType::Address, 4) => NativeValue::Address(self.read::<u32>(offset) as usize),
            (NativeType::Address, _) => NativeValue::Address(self.read::<u64>(offset) as usize),
            (ty, 1) if ty.is_unsigned() => NativeValue::U8(self.read(offset)),
            (_, 1) => NativeValue::I8(self.read(offset)),
            (ty, 2) if ty.is_unsigned() => NativeValue::U16(self.read(offset)),
            (_, 2) => NativeValue::I16(self.read(offset)),
            (ty, 4) if ty.is_unsigned() => NativeValue::U32(self.read(offset)),
            (_, 4) => NativeValue::I32(self.read(offset)),
            (ty, _) if ty.is_unsigned() => NativeValue::U64(self.read(offset)),
            (_, _) => NativeValue::I64(self.read(offset)),
        }
    }

    /// Write `value` as native type `ty`, truncating integers to its width
    ///
    /// # Safety
    /// The range covered by `ty` at `offset` must be writable.
    pub unsafe fn put(self, offset: usize, ty: NativeType, value: NativeValue, platform: &Platform) {
        match (ty, ty.size(platform)) {
            (NativeType::Void, _) => {}
            (NativeType::Float, _) => self.write(offset, value.as_f64() as f32),
            (NativeType::Double, _) => self.write(offset, value.as_f64()),
            (_, 1) => self.write(offset, value.as_i64() as u8),
            (_, 2) => self.write(offset, value.as_i64() as u16),
            (_, 4) => self.write(offset, value.as_i64() as u32),
            (_, _) => self.write(offset, value.as_i64() as u64),
        }
    }

    /// Read a pointer-width address
    ///
    /// # Safety
    /// See [`Pointer::get`].
    #[inline]
    pub unsafe fn get_address(self, offset: usize, platform: &Platform) -> usize {
        self.get(offset, NativeType::Address, platform).as_address()
    }

    /// # Safety
    /// See [`Pointer::put`].
    #[inline]
    pub unsafe fn put_address(self, offset: usize, address: usize, platform: &Platform) {
        self.put(offset, NativeType::Address, NativeValue::Address(address), platform)
    }

    /// Zero-fill `len` bytes
    ///
    /// # Safety
    /// The range must be writable.
    pub unsafe fn zero(self, offset: usize, len: usize) {
        std::ptr::write_bytes(self.at::<u8>(offset), 0, len)
    }

    /// Copy `len` bytes from `src` into `self + offset`
    ///
    /// # Safety
    /// Both ranges must be valid and must not overlap.
    pub unsafe fn copy_from(self, offset: usize, src: Pointer, len: usize) {
        std::ptr::copy_nonoverlapping(src.at::<u8>(0), self.at::<u8>(offset), len)
    }

    /// # Safety
    /// The range must be readable.
    pub unsafe fn bytes(self, offset: usize, len: usize) -> Vec<u8> {
        std::slice::from_raw_parts(self.at::<u8>(offset) as *const u8, len).to_vec()
    }

    /// Length of the NUL-terminated string at `self + offset`, bounded by
    /// `limit` when the buffer size is known
    ///
    /// # Safety
    /// Memory must be readable up to the terminator (or `limit`).
    pub unsafe fn c_strlen(self, offset: usize, limit: Option<usize>) -> usize {
        let start = self.at::<libc::c_char>(offset);
        match limit {
            None => libc::strlen(start),
            Some(limit) => {
                let bytes = std::slice::from_raw_parts(start as *const u8, limit);
                bytes.iter().position(|&b| b == 0).unwrap_or(limit)
            }
        }
    }

    /// Decode a NUL-terminated string
    ///
    /// # Safety
    /// See [`Pointer::c_strlen`].
    pub unsafe fn get_string(
        self,
        offset: usize,
        limit: Option<usize>,
        encoding: StringEncoding,
    ) -> Result<String, MarshalError> {
        let len = self.c_strlen(offset, limit);
        encoding.decode(&self.bytes(offset, len))
    }

    /// Encode `s` into a fixed buffer of `capacity` bytes, truncating and
    /// always leaving a terminator when `capacity > 0`
    ///
    /// # Safety
    /// `capacity` bytes at `self + offset` must be writable.
    pub unsafe fn put_string(
        self,
        offset: usize,
        capacity: usize,
        s: &str,
        encoding: StringEncoding,
    ) -> Result<(), MarshalError> {
        let bytes = encoding.encode(s)?;
        let len = bytes.len().min(capacity.saturating_sub(1));
        self.zero(offset, capacity);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.at::<u8>(offset), len);
        Ok(())
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests;
