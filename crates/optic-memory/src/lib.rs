//! Optic Memory - pool-tagged memory views
//!
//! This crate provides the memory model the capture engine observes through:
//!
//! - [`Pool`]: a memory ownership domain, application- or interceptor-owned
//! - [`Slice`]: a typed, bounds-checked view tagged with its pool
//! - [`MemoryError`]: refused mutations and fallible access failures
//!
//! The one invariant everything here serves: **application-owned memory is
//! never mutated by the capture engine**. Ownership is an explicit runtime
//! tag on every pool, checked at every mutation entry point, rather than a
//! convention at call sites.

pub mod error;
pub mod pool;
pub mod slice;

pub use error::{MemoryError, MemoryResult};
pub use pool::{Pool, PoolId, PoolKind};
pub use slice::Slice;
