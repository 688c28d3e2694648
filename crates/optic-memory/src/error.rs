//! Memory access error types.

use thiserror::Error;

use crate::pool::PoolId;

/// Errors from pool and slice operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A mutation targeted application-owned memory.
    ///
    /// The capture engine must never mutate memory the instrumented program
    /// owns; writing there is the real API call's job.
    #[error("Refused write to application pool {pool}")]
    ApplicationPoolWrite {
        /// The pool that was targeted.
        pool: PoolId,
    },

    /// A fallible element access was out of bounds.
    #[error("Slice access out of bounds: index {index}, count {count}")]
    OutOfBounds {
        /// The requested element index.
        index: usize,
        /// The slice's element count.
        count: usize,
    },
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
