//! Typed, pool-tagged views over contiguous memory.
//!
//! A [`Slice`] is `(base, count, pool)`: a bounds-checked window of `count`
//! elements plus a handle to the pool the bytes live in. The pool tag is
//! what lets the capture engine decide, at every mutation entry point,
//! whether a write is legal: application-pool slices are read-only here.

use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use tracing::warn;

use crate::error::{MemoryError, MemoryResult};
use crate::pool::Pool;

/// A view of `count` elements of `T` inside a [`Pool`].
///
/// Cloning a slice clones the view, not the bytes; both clones refer to the
/// same memory. Element reads are by value (`T: Copy`), and may be
/// unaligned: intercepted calls hand over arbitrary pointers.
pub struct Slice<T> {
    base: *mut T,
    count: usize,
    pool: Arc<Pool>,
    _elem: PhantomData<*mut T>,
}

impl<T: Copy> Slice<T> {
    /// Create a slice over `count` elements starting at `base`.
    ///
    /// # Safety
    ///
    /// `[base, base + count)` must lie within `pool`'s region, and the
    /// region must be valid for reads of `T` for the life of the slice.
    pub unsafe fn new(base: *mut T, count: usize, pool: Arc<Pool>) -> Self {
        debug_assert!(
            count == 0 || {
                let offset = base as usize - pool.base() as usize;
                pool.contains(offset, count * std::mem::size_of::<T>())
            },
            "slice range escapes its pool"
        );
        Self {
            base,
            count,
            pool,
            _elem: PhantomData,
        }
    }

    /// View an entire pool as a slice of `T`.
    ///
    /// The element count is the pool size divided by `size_of::<T>()`;
    /// trailing bytes that do not fit a whole element are not included.
    pub fn of_pool(pool: Arc<Pool>) -> Self {
        debug_assert!(std::mem::size_of::<T>() > 0, "zero-sized slice element");
        let count = pool.size() / std::mem::size_of::<T>();
        let base = pool.base() as *mut T;
        // SAFETY: [base, base + count) is within the pool by construction.
        unsafe { Self::new(base, count, pool) }
    }

    /// Base pointer of the view.
    pub fn base_ptr(&self) -> *const T {
        self.base
    }

    /// Base address of the view as an integer.
    pub fn address(&self) -> usize {
        self.base as usize
    }

    /// Number of elements in the view.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Extent of the view in bytes.
    pub fn byte_len(&self) -> usize {
        self.count * std::mem::size_of::<T>()
    }

    /// The pool this view's bytes live in.
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Whether the bytes belong to the instrumented program.
    pub fn is_application_pool(&self) -> bool {
        self.pool.is_application()
    }

    /// Read the `index`'th element by value.
    ///
    /// Panics if `index` is out of bounds; element indexes are
    /// caller-guaranteed in the capture path. Use [`Slice::try_get`] for a
    /// recoverable check.
    pub fn get(&self, index: usize) -> T {
        assert!(index < self.count, "slice index {index} out of bounds");
        // SAFETY: index is in bounds and the pool is valid for reads.
        // Unaligned read: intercepted pointers carry no alignment promise.
        unsafe { self.base.add(index).read_unaligned() }
    }

    /// Read the `index`'th element, failing on out-of-bounds.
    pub fn try_get(&self, index: usize) -> MemoryResult<T> {
        if index >= self.count {
            return Err(MemoryError::OutOfBounds {
                index,
                count: self.count,
            });
        }
        Ok(self.get(index))
    }

    /// Write `value` to the `index`'th element.
    ///
    /// Fails with [`MemoryError::ApplicationPoolWrite`] if the slice lives
    /// in application-owned memory: the engine never mutates what the
    /// instrumented program owns. Panics on out-of-bounds.
    pub fn set(&self, index: usize, value: T) -> MemoryResult<()> {
        assert!(index < self.count, "slice index {index} out of bounds");
        self.check_mutable()?;
        // SAFETY: index is in bounds and the pool is interceptor-owned, so
        // the engine holds the only mutable view during the call.
        unsafe { self.base.add(index).write_unaligned(value) };
        Ok(())
    }

    /// Write `value` to the `index`'th element, failing on out-of-bounds.
    pub fn try_set(&self, index: usize, value: T) -> MemoryResult<()> {
        if index >= self.count {
            return Err(MemoryError::OutOfBounds {
                index,
                count: self.count,
            });
        }
        self.set(index, value)
    }

    /// Copy `count` leading elements from `src` into this slice.
    ///
    /// Fails if this slice is application-owned. Panics if `count` exceeds
    /// either extent; callers clamp to `min(src.count, dst.count)`.
    pub fn copy_from(&self, src: &Slice<T>, count: usize) -> MemoryResult<()> {
        assert!(count <= self.count, "copy overruns destination");
        assert!(count <= src.count, "copy overruns source");
        self.check_mutable()?;
        // SAFETY: both ranges are in bounds; copy (not copy_nonoverlapping)
        // tolerates views over the same pool.
        unsafe {
            std::ptr::copy(
                src.base as *const u8,
                self.base as *mut u8,
                count * std::mem::size_of::<T>(),
            );
        }
        Ok(())
    }

    /// A sub-view over `range` of this slice's elements.
    ///
    /// Panics if the range is out of bounds.
    pub fn subslice(&self, range: Range<usize>) -> Slice<T> {
        assert!(range.start <= range.end && range.end <= self.count);
        // SAFETY: the sub-range stays within this slice, hence its pool.
        unsafe {
            Slice::new(
                self.base.add(range.start),
                range.end - range.start,
                Arc::clone(&self.pool),
            )
        }
    }

    /// Copy the slice's elements out into a `Vec`.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.count).map(|i| self.get(i)).collect()
    }

    /// Copy the slice's raw bytes out into a `Vec`.
    pub fn to_bytes(&self) -> Vec<u8> {
        // SAFETY: the byte extent is valid for reads for the slice's life.
        unsafe { std::slice::from_raw_parts(self.base as *const u8, self.byte_len()) }.to_vec()
    }

    fn check_mutable(&self) -> MemoryResult<()> {
        if self.pool.is_application() {
            warn!(pool = %self.pool.id(), "Refused write to application pool");
            return Err(MemoryError::ApplicationPoolWrite {
                pool: self.pool.id(),
            });
        }
        Ok(())
    }
}

impl<T> Clone for Slice<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base,
            count: self.count,
            pool: Arc::clone(&self.pool),
            _elem: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Slice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("base", &self.base)
            .field("count", &self.count)
            .field("pool", &self.pool.id())
            .field("kind", &self.pool.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolKind;

    fn app_slice(backing: &mut [u8]) -> (Slice<u8>, Arc<Pool>) {
        let pool = unsafe { Pool::application(backing.as_mut_ptr(), backing.len()) };
        (Slice::of_pool(Arc::clone(&pool)), pool)
    }

    #[test]
    fn test_of_pool_counts_whole_elements() {
        let pool = Pool::interceptor(13);
        let slice: Slice<u32> = Slice::of_pool(pool);
        assert_eq!(slice.count(), 3);
        assert_eq!(slice.byte_len(), 12);
    }

    #[test]
    fn test_get_set_round_trip() {
        let pool = Pool::interceptor(16);
        let slice: Slice<u32> = Slice::of_pool(pool);
        slice.set(2, 0xDEAD_BEEF).unwrap();
        assert_eq!(slice.get(2), 0xDEAD_BEEF);
        assert_eq!(slice.get(0), 0);
    }

    #[test]
    fn test_unaligned_element_access() {
        let pool = Pool::interceptor(9);
        let whole: Slice<u8> = Slice::of_pool(Arc::clone(&pool));
        // A u32 view starting one byte in is unaligned on purpose.
        let skewed: Slice<u32> =
            unsafe { Slice::new(pool.base().add(1) as *mut u32, 2, pool) };
        skewed.set(0, 0x0102_0304).unwrap();
        assert_eq!(skewed.get(0), 0x0102_0304);
        assert_eq!(whole.get(0), 0);
    }

    #[test]
    fn test_application_pool_write_refused() {
        let mut backing = [42u8; 8];
        let (slice, pool) = app_slice(&mut backing);
        assert_eq!(pool.kind(), PoolKind::Application);

        let err = slice.set(0, 9).unwrap_err();
        assert!(matches!(err, MemoryError::ApplicationPoolWrite { .. }));
        assert_eq!(backing[0], 42);
    }

    #[test]
    fn test_application_pool_read_allowed() {
        let mut backing = [1u8, 2, 3, 4];
        let (slice, _pool) = app_slice(&mut backing);
        assert_eq!(slice.get(2), 3);
        assert_eq!(slice.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_try_get_out_of_bounds() {
        let pool = Pool::interceptor(4);
        let slice: Slice<u8> = Slice::of_pool(pool);
        assert!(slice.try_get(3).is_ok());
        let err = slice.try_get(4).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfBounds { index: 4, count: 4 }));
    }

    #[test]
    fn test_copy_from() {
        let mut src_backing = [10u8, 20, 30, 40];
        let (src, _p) = app_slice(&mut src_backing);
        let dst: Slice<u8> = Slice::of_pool(Pool::interceptor(4));

        dst.copy_from(&src, 4).unwrap();
        assert_eq!(dst.to_vec(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_copy_into_application_pool_refused() {
        let src: Slice<u8> = Slice::of_pool(Pool::interceptor(4));
        let mut backing = [0u8; 4];
        let (dst, _p) = app_slice(&mut backing);
        assert!(dst.copy_from(&src, 4).is_err());
    }

    #[test]
    fn test_subslice() {
        let pool = Pool::interceptor(8);
        let slice: Slice<u8> = Slice::of_pool(pool);
        for i in 0..8 {
            slice.set(i, i as u8).unwrap();
        }
        let sub = slice.subslice(2..5);
        assert_eq!(sub.count(), 3);
        assert_eq!(sub.to_vec(), vec![2, 3, 4]);
        assert_eq!(sub.address(), slice.address() + 2);
    }

    #[test]
    fn test_clone_shares_memory() {
        let pool = Pool::interceptor(4);
        let a: Slice<u8> = Slice::of_pool(pool);
        let b = a.clone();
        a.set(0, 7).unwrap();
        assert_eq!(b.get(0), 7);
    }
}
