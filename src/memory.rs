//! Byte buffers and the memory managers that allocate, copy and free them.

use alloc::alloc::alloc;
use alloc::alloc::dealloc;
use core::alloc::Layout;
use core::cell::Cell;
use core::fmt::Debug;
use core::ptr::NonNull;

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;

/// An owned, host-addressable byte buffer handed out by a [`MemoryManager`].
///
/// A buffer does not free itself on drop: it must be handed back to the
/// manager that allocated it through [`MemoryManager::free`].
pub struct DeviceBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl DeviceBuffer {
    /// Wraps a raw allocation.
    ///
    /// # Safety
    ///
    /// - `ptr` must be valid for reads and writes of `len` bytes from the host
    ///   for as long as the returned buffer exists.
    /// - The allocation must be exclusively owned by the returned buffer.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// A zero-length buffer that owns no allocation.
    pub fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Consumes the buffer and returns its pointer and length.
    pub fn into_raw_parts(self) -> (NonNull<u8>, usize) {
        (self.ptr, self.len)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Views the buffer as bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `from_raw_parts` requires `ptr` to be valid for `len` bytes and
        // exclusively owned; a dangling pointer is valid for zero bytes.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Views the buffer as mutable bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: As in `as_slice`, and `&mut self` guarantees unique access.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

// SAFETY: A buffer exclusively owns its allocation and exposes it only through
// `&self`/`&mut self`, so it can move and be shared like a `Vec<u8>`.
unsafe impl Send for DeviceBuffer {}

// SAFETY: `&DeviceBuffer` only permits reading the bytes.
unsafe impl Sync for DeviceBuffer {}

impl Debug for DeviceBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len)
            .field("bytes", &self.as_slice())
            .finish()
    }
}

/// Allocates, copies and frees byte buffers on a [`Device`].
///
/// A hashmap calls into its manager synchronously and from a single thread of
/// control. Implementations for other devices provide the same three
/// primitives.
pub trait MemoryManager {
    /// Allocates `size` bytes on `device`.
    fn malloc(&self, size: usize, device: &Device) -> Result<DeviceBuffer>;

    /// Releases a buffer previously returned by `malloc` on the same device.
    fn free(&self, buffer: DeviceBuffer, device: &Device);

    /// Copies all of `src`, living on `src_device`, into `dst`, living on
    /// `dst_device`. Both sides must have the same length.
    fn memcpy(
        &self,
        dst: &mut DeviceBuffer,
        dst_device: &Device,
        src: &[u8],
        src_device: &Device,
    ) -> Result<()>;
}

impl<M: MemoryManager + ?Sized> MemoryManager for &M {
    fn malloc(&self, size: usize, device: &Device) -> Result<DeviceBuffer> {
        (**self).malloc(size, device)
    }

    fn free(&self, buffer: DeviceBuffer, device: &Device) {
        (**self).free(buffer, device)
    }

    fn memcpy(
        &self,
        dst: &mut DeviceBuffer,
        dst_device: &Device,
        src: &[u8],
        src_device: &Device,
    ) -> Result<()> {
        (**self).memcpy(dst, dst_device, src, src_device)
    }
}

/// Host memory manager backed by the global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuMemoryManager;

impl MemoryManager for CpuMemoryManager {
    fn malloc(&self, size: usize, device: &Device) -> Result<DeviceBuffer> {
        if !device.is_host() {
            return Err(Error::UnsupportedDevice(*device));
        }
        if size == 0 {
            return Ok(DeviceBuffer::empty());
        }

        let failure = || Error::AllocationFailure {
            size,
            device: *device,
        };
        let layout = Layout::from_size_align(size, 1).map_err(|_| failure())?;

        // SAFETY: `layout` has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc(layout) }).ok_or_else(failure)?;

        // SAFETY: `ptr` was just allocated with `size` bytes and nothing else
        // refers to it.
        Ok(unsafe { DeviceBuffer::from_raw_parts(ptr, size) })
    }

    fn free(&self, buffer: DeviceBuffer, device: &Device) {
        debug_assert!(device.is_host(), "freeing a host buffer on {device}");

        let (ptr, len) = buffer.into_raw_parts();
        if len == 0 {
            return;
        }

        // SAFETY: Non-empty buffers of this manager come from `malloc`, which
        // allocated them with exactly this layout.
        unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(len, 1)) }
    }

    fn memcpy(
        &self,
        dst: &mut DeviceBuffer,
        dst_device: &Device,
        src: &[u8],
        src_device: &Device,
    ) -> Result<()> {
        if !dst_device.is_host() || !src_device.is_host() {
            return Err(Error::DeviceMismatch {
                dst: *dst_device,
                src: *src_device,
            });
        }
        if dst.len() != src.len() {
            return Err(Error::SizeMismatch {
                dst: dst.len(),
                src: src.len(),
            });
        }

        dst.as_mut_slice().copy_from_slice(src);
        Ok(())
    }
}

/// A memory manager wrapper that counts live buffers and can inject
/// allocation failures.
///
/// Useful for checking that a hashmap releases exactly what it allocates.
///
/// ```rust
/// # use record_hashmap::{CpuMemoryManager, Device, MemoryManager, TrackingMemoryManager};
/// let memory = TrackingMemoryManager::new(CpuMemoryManager);
/// let buffer = memory.malloc(8, &Device::cpu()).unwrap();
/// assert_eq!(memory.live_buffers(), 1);
/// memory.free(buffer, &Device::cpu());
/// assert_eq!(memory.live_buffers(), 0);
/// ```
#[derive(Debug, Default)]
pub struct TrackingMemoryManager<M = CpuMemoryManager> {
    inner: M,
    live: Cell<usize>,
    allocations: Cell<usize>,
    remaining: Cell<Option<usize>>,
}

impl<M: MemoryManager> TrackingMemoryManager<M> {
    /// Wraps `inner`.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            live: Cell::new(0),
            allocations: Cell::new(0),
            remaining: Cell::new(None),
        }
    }

    /// Makes every allocation after the next `successes` ones fail.
    /// `None` lifts the limit.
    pub fn set_fail_after(&self, successes: Option<usize>) {
        self.remaining.set(successes);
    }

    /// Number of buffers allocated and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.live.get()
    }

    /// Number of successful allocations over the manager's lifetime.
    pub fn total_allocations(&self) -> usize {
        self.allocations.get()
    }
}

impl<M: MemoryManager> MemoryManager for TrackingMemoryManager<M> {
    fn malloc(&self, size: usize, device: &Device) -> Result<DeviceBuffer> {
        match self.remaining.get() {
            Some(0) => {
                return Err(Error::AllocationFailure {
                    size,
                    device: *device,
                });
            }
            Some(n) => self.remaining.set(Some(n - 1)),
            None => {}
        }

        let buffer = self.inner.malloc(size, device)?;
        self.live.set(self.live.get() + 1);
        self.allocations.set(self.allocations.get() + 1);
        Ok(buffer)
    }

    fn free(&self, buffer: DeviceBuffer, device: &Device) {
        debug_assert!(self.live.get() > 0, "free without a live allocation");
        self.live.set(self.live.get().saturating_sub(1));
        self.inner.free(buffer, device);
    }

    fn memcpy(
        &self,
        dst: &mut DeviceBuffer,
        dst_device: &Device,
        src: &[u8],
        src_device: &Device,
    ) -> Result<()> {
        self.inner.memcpy(dst, dst_device, src, src_device)
    }
}
