//! Memory ownership domains.
//!
//! Every byte the capture engine touches belongs to a pool. Application
//! pools wrap memory owned by the instrumented program; the engine may read
//! them but never writes. Interceptor pools are allocated by the engine
//! itself and are freely mutable.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pool, for diagnostics and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(u64);

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ownership domain of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Owned by the instrumented program. Read-only for the engine.
    Application,
    /// Owned by the interception system. Freely mutable.
    Interceptor,
}

/// A contiguous memory region tagged with its ownership domain.
///
/// Interceptor pools own their (zero-initialized) storage and release it
/// when the last `Arc` drops. Application pools borrow foreign memory; the
/// caller guarantees it stays valid while slices over the pool exist.
///
/// Pools are deliberately neither `Send` nor `Sync` (raw base pointer):
/// they are used only by the thread executing the intercepted call.
pub struct Pool {
    id: PoolId,
    kind: PoolKind,
    base: *mut u8,
    size: usize,
    /// Backing storage for interceptor pools. Boxed so `base` stays stable.
    _storage: Option<Box<[UnsafeCell<u8>]>>,
}

impl Pool {
    /// Wrap a region of application-owned memory.
    ///
    /// # Safety
    ///
    /// `base` must point to `size` readable bytes that remain valid for as
    /// long as any slice over this pool is used. The engine will read this
    /// region (at materialization time) but never write to it.
    pub unsafe fn application(base: *mut u8, size: usize) -> Arc<Pool> {
        let pool = Arc::new(Pool {
            id: PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)),
            kind: PoolKind::Application,
            base,
            size,
            _storage: None,
        });
        debug!(pool = %pool.id, size, "Application pool wrapped");
        pool
    }

    /// Allocate a new interceptor-owned pool of `size` zeroed bytes.
    pub fn interceptor(size: usize) -> Arc<Pool> {
        let storage: Box<[UnsafeCell<u8>]> =
            (0..size).map(|_| UnsafeCell::new(0)).collect();
        let base = storage.as_ptr() as *mut u8;
        let pool = Arc::new(Pool {
            id: PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)),
            kind: PoolKind::Interceptor,
            base,
            size,
            _storage: Some(storage),
        });
        debug!(pool = %pool.id, size, "Interceptor pool allocated");
        pool
    }

    /// The pool's unique identifier.
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// The pool's ownership domain.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Whether this pool belongs to the instrumented program.
    pub fn is_application(&self) -> bool {
        self.kind == PoolKind::Application
    }

    /// Base address of the region.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether `[offset, offset + len)` lies within the pool.
    pub fn contains(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size)
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("base", &self.base)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interceptor_pool_zeroed() {
        let pool = Pool::interceptor(64);
        assert_eq!(pool.kind(), PoolKind::Interceptor);
        assert!(!pool.is_application());
        assert_eq!(pool.size(), 64);
        let bytes = unsafe { std::slice::from_raw_parts(pool.base(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_application_pool_wraps_foreign_memory() {
        let mut backing = [7u8; 16];
        let pool = unsafe { Pool::application(backing.as_mut_ptr(), backing.len()) };
        assert!(pool.is_application());
        assert_eq!(pool.base(), backing.as_mut_ptr());
        assert_eq!(pool.size(), 16);
    }

    #[test]
    fn test_pool_ids_unique() {
        let a = Pool::interceptor(1);
        let b = Pool::interceptor(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_contains() {
        let pool = Pool::interceptor(16);
        assert!(pool.contains(0, 16));
        assert!(pool.contains(8, 8));
        assert!(!pool.contains(8, 9));
        assert!(!pool.contains(usize::MAX, 2));
    }
}
