//! Chunked bump allocator scoped to one intercepted call.
//!
//! The arena hands out regions of raw slabs. Slabs never move and are never
//! freed individually; dropping the arena releases every allocation in one
//! step. That is the whole point: objects created while observing a call
//! (scratch buffers, staging copies) need no individual teardown.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::cell::{Cell, UnsafeCell};
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ArenaError, ArenaResult};

/// Configuration for a [`ScratchArena`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Size of each slab requested from the global allocator.
    ///
    /// Defaults to 64KB. Requests larger than this get a dedicated slab.
    pub chunk_size: usize,

    /// Optional cap on total bytes handed out by this arena.
    ///
    /// `None` means unbounded. Defaults to `None`.
    pub max_bytes: Option<usize>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024, // 64KB
            max_bytes: None,
        }
    }
}

impl ArenaConfig {
    /// Create a new arena configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the slab size.
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the total allocation cap.
    pub fn with_max_bytes(mut self, bytes: usize) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    /// Create a small configuration for tests.
    pub fn minimal() -> Self {
        Self {
            chunk_size: 256,
            max_bytes: Some(64 * 1024),
        }
    }
}

/// Statistics snapshot from a [`ScratchArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out to callers, including alignment padding.
    pub bytes_allocated: usize,
    /// Bytes reserved from the global allocator across all slabs.
    pub bytes_reserved: usize,
    /// Number of slabs currently held.
    pub chunk_count: usize,
    /// Number of allocation requests served.
    pub allocation_count: usize,
}

impl ArenaStats {
    /// Fraction of reserved bytes actually handed out.
    pub fn utilization_percent(&self) -> f64 {
        if self.bytes_reserved == 0 {
            0.0
        } else {
            (self.bytes_allocated as f64 / self.bytes_reserved as f64) * 100.0
        }
    }
}

/// Minimum alignment of every slab base.
const SLAB_ALIGN: usize = 16;

/// One raw zeroed region obtained from the global allocator.
///
/// Allocations are carved out of `base` with raw-pointer arithmetic only.
/// Reborrowing the slab as a slice would invalidate every `&mut` already
/// handed out from it, so no reference to slab memory is ever formed here.
struct Slab {
    base: NonNull<u8>,
    layout: Layout,
}

impl Slab {
    fn zeroed(len: usize, align: usize) -> ArenaResult<Self> {
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| ArenaError::InvalidLayout { size: len, align })?;
        // SAFETY: `len` is never zero; callers size slabs from non-empty
        // requests.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));
        Ok(Self { base, layout })
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `base` was allocated with exactly this layout and is
        // freed exactly once.
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

/// Bump allocator whose entire output is released together when dropped.
///
/// One arena backs one call observer. Allocations borrow the arena, so they
/// cannot outlive it; there are no individual frees. `reset` rewinds the
/// arena for reuse, keeping the first slab.
///
/// The arena is intentionally neither `Send` nor `Sync`: it belongs to the
/// single thread executing the intercepted call.
pub struct ScratchArena {
    config: ArenaConfig,
    /// Raw slabs. Slab memory never moves even when this vec grows.
    chunks: UnsafeCell<Vec<Slab>>,
    /// Bump offset into the last slab.
    offset: Cell<usize>,
    bytes_allocated: Cell<usize>,
    bytes_reserved: Cell<usize>,
    allocation_count: Cell<usize>,
}

impl ScratchArena {
    /// Create a new arena with the given configuration.
    ///
    /// No memory is reserved until the first allocation.
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            config,
            chunks: UnsafeCell::new(Vec::new()),
            offset: Cell::new(0),
            bytes_allocated: Cell::new(0),
            bytes_reserved: Cell::new(0),
            allocation_count: Cell::new(0),
        }
    }

    /// Create an arena with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ArenaConfig::default())
    }

    /// Allocate `len` zero-initialized bytes.
    ///
    /// A zero-length request returns an empty slice without consuming space.
    pub fn alloc_bytes(&self, len: usize) -> ArenaResult<&mut [u8]> {
        if len == 0 {
            return Ok(&mut []);
        }
        let ptr = self.alloc_raw(len, 1)?;
        // SAFETY: alloc_raw returned a region of `len` zeroed bytes inside a
        // slab that lives until the arena drops, disjoint from every other
        // allocation this arena has handed out.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
    }

    /// Allocate a zero-initialized slice of `count` values of `T`.
    ///
    /// Alignment of `T` is respected. `T: Copy` keeps the arena free of drop
    /// obligations: nothing allocated here runs a destructor.
    pub fn alloc_slice<T: Copy>(&self, count: usize) -> ArenaResult<&mut [T]> {
        if count == 0 {
            return Ok(&mut []);
        }
        let size = std::mem::size_of::<T>()
            .checked_mul(count)
            .ok_or(ArenaError::SizeOverflow { count })?;
        let ptr = self.alloc_raw(size, std::mem::align_of::<T>())?;
        // SAFETY: the region is `size` bytes, aligned for T, zeroed (a valid
        // bit pattern would not matter for Copy types handed back as zeroed
        // storage), and disjoint from all other live allocations.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr as *mut T, count) })
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.get()
    }

    /// Bytes reserved from the global allocator.
    pub fn bytes_reserved(&self) -> usize {
        self.bytes_reserved.get()
    }

    /// Number of allocation requests served.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.get()
    }

    /// Get a snapshot of the current statistics.
    pub fn stats(&self) -> ArenaStats {
        // SAFETY: shared read of the chunk list; no allocation is in flight
        // because `&self` methods never re-enter.
        let chunk_count = unsafe { (*self.chunks.get()).len() };
        ArenaStats {
            bytes_allocated: self.bytes_allocated.get(),
            bytes_reserved: self.bytes_reserved.get(),
            chunk_count,
            allocation_count: self.allocation_count.get(),
        }
    }

    /// Rewind the arena, releasing all but the first slab.
    ///
    /// Requires exclusive access, so no outstanding allocation can survive
    /// the rewind. The retained slab is re-zeroed.
    pub fn reset(&mut self) {
        let chunks = self.chunks.get_mut();
        chunks.truncate(1);
        if let Some(first) = chunks.first() {
            // SAFETY: `&mut self` means no allocation borrow survives into
            // this call; the whole slab can be re-zeroed.
            unsafe { std::ptr::write_bytes(first.base.as_ptr(), 0, first.len()) };
            self.bytes_reserved.set(first.len());
        } else {
            self.bytes_reserved.set(0);
        }
        self.offset.set(0);
        self.bytes_allocated.set(0);
        self.allocation_count.set(0);
        trace!(retained_bytes = self.bytes_reserved.get(), "Arena reset");
    }

    fn alloc_raw(&self, size: usize, align: usize) -> ArenaResult<*mut u8> {
        debug_assert!(align.is_power_of_two());

        // SAFETY: single-threaded interior mutability; no reference into
        // slab memory is formed here, only into the slab list itself.
        let chunks = unsafe { &mut *self.chunks.get() };

        let offset = self.offset.get();
        // Padding is computed from the absolute address, not the offset:
        // slab bases are only guaranteed SLAB_ALIGN.
        let (fits, pad, base) = match chunks.last() {
            Some(slab) => {
                let base = slab.base.as_ptr();
                let pad = (base as usize + offset).wrapping_neg() & (align - 1);
                (offset + pad + size <= slab.len(), pad, base)
            }
            None => (false, 0, std::ptr::null_mut()),
        };
        let charged = if fits { size + pad } else { size };

        if let Some(limit) = self.config.max_bytes {
            let remaining = limit.saturating_sub(self.bytes_allocated.get());
            if charged > remaining {
                return Err(ArenaError::Exhausted {
                    requested: size,
                    remaining,
                });
            }
        }

        let ptr = if fits {
            self.offset.set(offset + pad + size);
            // SAFETY: `offset + pad + size` is within the slab.
            unsafe { base.add(offset + pad) }
        } else {
            // A fresh slab is allocated aligned for the request, so it
            // starts unpadded at offset zero.
            let chunk_len = size.max(self.config.chunk_size);
            let slab = Slab::zeroed(chunk_len, align.max(SLAB_ALIGN))?;
            let base = slab.base.as_ptr();
            self.bytes_reserved
                .set(self.bytes_reserved.get() + chunk_len);
            debug!(
                slab_bytes = chunk_len,
                total_reserved = self.bytes_reserved.get(),
                "Arena slab allocated"
            );
            chunks.push(slab);
            self.offset.set(size);
            base
        };

        self.bytes_allocated.set(self.bytes_allocated.get() + charged);
        self.allocation_count.set(self.allocation_count.get() + 1);
        trace!(size, align, "Arena allocation");
        Ok(ptr)
    }
}

impl std::fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchArena")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_bytes() {
        let arena = ScratchArena::with_defaults();
        let buf = arena.alloc_bytes(16).unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&b| b == 0));
        buf[0] = 0xAB;
        assert_eq!(arena.bytes_allocated(), 16);
        assert_eq!(arena.allocation_count(), 1);
    }

    #[test]
    fn test_zero_length_is_free() {
        let arena = ScratchArena::with_defaults();
        let buf = arena.alloc_bytes(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(arena.bytes_allocated(), 0);
        assert_eq!(arena.stats().chunk_count, 0);
    }

    #[test]
    fn test_allocations_are_disjoint() {
        let arena = ScratchArena::with_defaults();
        let a = arena.alloc_bytes(8).unwrap();
        let b = arena.alloc_bytes(8).unwrap();
        a.fill(1);
        b.fill(2);
        assert!(a.iter().all(|&x| x == 1));
        assert!(b.iter().all(|&x| x == 2));
    }

    #[test]
    fn test_typed_alloc_alignment() {
        let arena = ScratchArena::with_defaults();
        let _skew = arena.alloc_bytes(3).unwrap();
        let vals = arena.alloc_slice::<u64>(4).unwrap();
        assert_eq!(vals.len(), 4);
        assert_eq!(vals.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
        assert!(vals.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_alloc_slice_overaligned_type() {
        #[repr(align(4096))]
        #[derive(Clone, Copy)]
        struct Page([u8; 4096]);

        let arena = ScratchArena::with_defaults();

        // Fresh-slab path: the slab itself is allocated page-aligned.
        let first = arena.alloc_slice::<Page>(1).unwrap();
        assert_eq!(first.as_ptr() as usize % 4096, 0);

        // In-slab path: padding is derived from the absolute address.
        let _skew = arena.alloc_bytes(1).unwrap();
        let second = arena.alloc_slice::<Page>(1).unwrap();
        assert_eq!(second.as_ptr() as usize % 4096, 0);
    }

    #[test]
    fn test_live_allocations_survive_slab_growth() {
        let arena = ScratchArena::new(ArenaConfig::new().with_chunk_size(64));
        let a = arena.alloc_bytes(32).unwrap();
        a.fill(0x11);
        let b = arena.alloc_bytes(128).unwrap(); // forces a dedicated slab
        b.fill(0x22);
        let c = arena.alloc_bytes(16).unwrap();
        c.fill(0x33);

        // Earlier allocations stay usable after later ones, within and
        // across slabs.
        assert!(a.iter().all(|&x| x == 0x11));
        assert!(b.iter().all(|&x| x == 0x22));
        assert!(c.iter().all(|&x| x == 0x33));
    }

    #[test]
    fn test_oversized_request_gets_own_slab() {
        let config = ArenaConfig::new().with_chunk_size(64);
        let arena = ScratchArena::new(config);
        arena.alloc_bytes(16).unwrap();
        arena.alloc_bytes(1024).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.chunk_count, 2);
        assert!(stats.bytes_reserved >= 1024 + 64);
    }

    #[test]
    fn test_capacity_cap() {
        let config = ArenaConfig::new().with_chunk_size(64).with_max_bytes(100);
        let arena = ScratchArena::new(config);
        arena.alloc_bytes(60).unwrap();
        let err = arena.alloc_bytes(60).unwrap_err();
        match err {
            ArenaError::Exhausted { requested, remaining } => {
                assert_eq!(requested, 60);
                assert_eq!(remaining, 40);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reset_rewinds_and_rezeroes() {
        let mut arena = ScratchArena::new(ArenaConfig::new().with_chunk_size(64));
        arena.alloc_bytes(32).unwrap().fill(0xFF);
        arena.alloc_bytes(1024).unwrap();
        arena.reset();

        assert_eq!(arena.bytes_allocated(), 0);
        assert_eq!(arena.stats().chunk_count, 1);

        let buf = arena.alloc_bytes(32).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_stats_utilization() {
        let arena = ScratchArena::new(ArenaConfig::new().with_chunk_size(100));
        arena.alloc_bytes(50).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.bytes_allocated, 50);
        assert_eq!(stats.bytes_reserved, 100);
        assert!((stats.utilization_percent() - 50.0).abs() < 0.01);
    }
}
