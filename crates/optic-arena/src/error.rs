//! Arena error types.

use thiserror::Error;

/// Errors from scratch arena allocation.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The arena's byte cap would be exceeded.
    #[error("Arena exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted {
        /// Bytes requested by the failing allocation.
        requested: usize,
        /// Bytes remaining under the cap.
        remaining: usize,
    },

    /// `count * size_of::<T>()` overflowed.
    #[error("Allocation size overflow for {count} elements")]
    SizeOverflow {
        /// Element count of the failing request.
        count: usize,
    },

    /// The request cannot be expressed as an allocation layout.
    #[error("Invalid allocation layout: {size} bytes aligned to {align}")]
    InvalidLayout {
        /// Requested slab size in bytes.
        size: usize,
        /// Requested slab alignment.
        align: usize,
    },
}

/// Result type alias for arena operations.
pub type ArenaResult<T> = std::result::Result<T, ArenaError>;
