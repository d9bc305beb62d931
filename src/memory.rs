// SPDX-License-Identifier: MIT

//! Host-visible staging buffers and allocation tracking.
//!
//! ## Buffer lifecycle
//!
//! A [`ManagedBuffer`] is allocated on demand for each conversion that needs
//! a new host-visible result (array → external buffer path). The conversion
//! populates it while it still has exclusive ownership, then hands it to the
//! caller-visible wrapper (an `Arc` shared with e.g. a NumPy base object).
//! The block is freed exactly once, when the last holder drops; it is never
//! freed while a mapped view or external wrapper still references it.
//!
//! [`MappedSlice`] / [`MappedSliceMut`] are the non-owning views the bridge
//! copies through. Conversions from an externally supplied buffer only read
//! (gather) or write (scatter) through such a view and never resize,
//! reallocate, or free memory they do not own.
//!
//! ## Tracking
//!
//! Staging allocations are recorded against a process-wide [`MemoryTracker`]
//! so leaks from repeated conversions show up as a non-returning baseline.

use crate::dtype::{Element, ElemType};
use crate::error::{BridgeError, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Non-owning read view over external element memory.
///
/// The pointer behind this view is owned by a foreign allocator; the view
/// must not outlive the foreign object it was mapped from. Whoever maps it
/// is responsible for that, and for the memory being host-visible.
#[derive(Debug, Clone, Copy)]
pub struct MappedSlice<'a, T> {
    data: &'a [T],
}

impl<'a, T: Element> MappedSlice<'a, T> {
    /// Map a borrowed slice.
    #[must_use]
    pub fn from_slice(data: &'a [T]) -> Self {
        Self { data }
    }

    /// Map `numel` elements of external memory at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to at least `numel` readable, properly aligned
    /// elements of `T` in host-visible memory, live for `'a`, and not be
    /// written through any other path while this view exists. When `numel`
    /// is 0 the pointer is never inspected; dangling or null addresses are
    /// fine for an empty view.
    #[must_use]
    pub unsafe fn from_raw(ptr: usize, numel: usize) -> Self {
        if numel == 0 {
            return Self { data: &[] };
        }
        Self {
            data: std::slice::from_raw_parts(ptr as *const T, numel),
        }
    }

    /// Number of mapped elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The mapped elements.
    #[must_use]
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

/// Non-owning write view over external element memory.
///
/// Same contract as [`MappedSlice`]; additionally the mapped range must not
/// be read or written through any other path while this view exists. The
/// bridge performs no internal locking — serializing overlapping scatters is
/// the caller's responsibility.
#[derive(Debug)]
pub struct MappedSliceMut<'a, T> {
    data: &'a mut [T],
}

impl<'a, T: Element> MappedSliceMut<'a, T> {
    /// Map a borrowed mutable slice.
    #[must_use]
    pub fn from_slice(data: &'a mut [T]) -> Self {
        Self { data }
    }

    /// Map `numel` elements of external memory at `ptr` for writing.
    ///
    /// # Safety
    ///
    /// As [`MappedSlice::from_raw`], plus exclusive access to the range for
    /// the lifetime of the view. A zero-element view never inspects `ptr`.
    #[must_use]
    pub unsafe fn from_raw(ptr: usize, numel: usize) -> Self {
        if numel == 0 {
            return Self { data: &mut [] };
        }
        Self {
            data: std::slice::from_raw_parts_mut(ptr as *mut T, numel),
        }
    }

    /// Number of mapped elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The mapped elements, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data
    }

    /// Reborrow as a read view.
    #[must_use]
    pub fn as_read(&self) -> MappedSlice<'_, T> {
        MappedSlice { data: self.data }
    }
}

/// Host-visible memory block with single-owner release semantics.
///
/// Zero-initialized on allocation. Freed exactly once, in `Drop`, after the
/// last holder releases it; sharing is done by wrapping the buffer in an
/// `Arc` when it is handed to the caller-visible wrapper.
#[derive(Debug)]
pub struct ManagedBuffer {
    ptr: NonNull<u8>,
    size_bytes: usize,
    elem: ElemType,
    numel: usize,
}

// The buffer is plain memory; views hand out ordinary slices.
unsafe impl Send for ManagedBuffer {}
unsafe impl Sync for ManagedBuffer {}

impl ManagedBuffer {
    /// Allocate a zeroed buffer for `numel` elements of `elem`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout is invalid (overflowing size).
    pub fn allocate(numel: usize, elem: ElemType) -> Result<Self> {
        let size_bytes = numel
            .checked_mul(elem.size_bytes())
            .ok_or_else(|| BridgeError::unsupported("buffer size overflows usize"))?;

        let ptr = if size_bytes == 0 {
            // dangling but element-aligned; never dereferenced
            NonNull::new(elem.size_bytes() as *mut u8)
                .ok_or_else(|| BridgeError::unsupported("zero-size element"))?
        } else {
            let layout = Self::layout(size_bytes, elem);
            // SAFETY: layout has non-zero size.
            let raw = unsafe { alloc_zeroed(layout) };
            NonNull::new(raw)
                .ok_or_else(|| BridgeError::unsupported("host-visible allocation failed"))?
        };

        staging_tracker().allocate(size_bytes);
        tracing::trace!(numel, elem = elem.name(), size_bytes, "managed buffer allocated");

        Ok(Self {
            ptr,
            size_bytes,
            elem,
            numel,
        })
    }

    fn layout(size_bytes: usize, elem: ElemType) -> Layout {
        // size is a multiple of the element size, so this cannot fail
        Layout::from_size_align(size_bytes, elem.size_bytes())
            .expect("element-aligned layout")
    }

    /// Number of elements the buffer holds.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size of the buffer in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Element type the buffer was allocated for.
    #[must_use]
    pub fn elem(&self) -> ElemType {
        self.elem
    }

    /// Raw address of the buffer, for handing to external wrappers.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Read view over the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DTypeMismatch`] if `T` does not match the
    /// element type the buffer was allocated for.
    pub fn mapped<T: Element>(&self) -> Result<MappedSlice<'_, T>> {
        self.check_elem::<T>()?;
        // SAFETY: the allocation is live, element-aligned, and sized for
        // exactly `numel` elements of T.
        Ok(unsafe { MappedSlice::from_raw(self.ptr.as_ptr() as usize, self.numel) })
    }

    /// Write view over the whole buffer.
    ///
    /// Requires exclusive ownership: conversions populate the buffer before
    /// sharing it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DTypeMismatch`] if `T` does not match the
    /// buffer's element type.
    pub fn mapped_mut<T: Element>(&mut self) -> Result<MappedSliceMut<'_, T>> {
        self.check_elem::<T>()?;
        // SAFETY: as `mapped`, and `&mut self` guarantees exclusivity.
        Ok(unsafe { MappedSliceMut::from_raw(self.ptr.as_ptr() as usize, self.numel) })
    }

    fn check_elem<T: Element>(&self) -> Result<()> {
        if T::ELEM == self.elem {
            Ok(())
        } else {
            Err(BridgeError::dtype_mismatch(self.elem.name(), T::ELEM.name()))
        }
    }
}

impl Drop for ManagedBuffer {
    fn drop(&mut self) {
        if self.size_bytes > 0 {
            // SAFETY: allocated in `allocate` with the identical layout;
            // Drop runs exactly once.
            unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.size_bytes, self.elem)) };
        }
        staging_tracker().deallocate(self.size_bytes);
        tracing::trace!(size_bytes = self.size_bytes, "managed buffer released");
    }
}

/// Estimate the memory required for a buffer of the given shape and element
/// type, without overhead.
#[must_use]
pub fn estimate_buffer_bytes(shape: &[usize], elem: ElemType) -> usize {
    let numel: usize = shape.iter().product();
    numel * elem.size_bytes()
}

/// Allocation tracker for staging buffers.
///
/// Thread-safe via atomics. Tracks current and peak usage plus an optional
/// limit; conversions consult it so an out-of-budget staging allocation can
/// be diagnosed instead of failing deep inside the allocator.
#[derive(Debug)]
pub struct MemoryTracker {
    allocated: AtomicUsize,
    peak: AtomicUsize,
    limit: AtomicUsize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    /// Create a new tracker with no limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            limit: AtomicUsize::new(0),
        }
    }

    /// Create a tracker with a byte limit.
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        let tracker = Self::new();
        tracker.limit.store(limit_bytes, Ordering::SeqCst);
        tracker
    }

    /// Record an allocation.
    pub fn allocate(&self, bytes: usize) {
        let new = self.allocated.fetch_add(bytes, Ordering::SeqCst) + bytes;

        let mut peak = self.peak.load(Ordering::SeqCst);
        while new > peak {
            match self
                .peak
                .compare_exchange_weak(peak, new, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    /// Record a deallocation.
    pub fn deallocate(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::SeqCst);
    }

    /// Currently allocated bytes.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Peak allocation over the tracker's lifetime.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Configured limit (0 = unlimited).
    #[must_use]
    pub fn limit_bytes(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    /// Whether an allocation of `bytes` would stay within the limit.
    #[must_use]
    pub fn would_fit(&self, bytes: usize) -> bool {
        let limit = self.limit.load(Ordering::SeqCst);
        limit == 0 || self.allocated.load(Ordering::SeqCst) + bytes <= limit
    }

    /// Reset counters to zero.
    pub fn reset(&self) {
        self.allocated.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
    }
}

/// Process-wide tracker for staging buffer allocations.
pub fn staging_tracker() -> &'static MemoryTracker {
    static TRACKER: OnceLock<MemoryTracker> = OnceLock::new();
    TRACKER.get_or_init(MemoryTracker::new)
}
