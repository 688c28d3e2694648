//! Capture error types.
//!
//! Two kinds of failure flow through the engine. Fatal precondition
//! violations (a null pointer where a string was promised) surface as
//! [`CaptureError`] and terminate the current call's capture; the partially
//! built record is discarded when the observer drops. API-level errors from
//! the real intercepted call are not errors here at all: they are data,
//! stored verbatim via `set_error` and read back by the spy.

use thiserror::Error;

use optic_arena::ArenaError;
use optic_memory::MemoryError;

/// Errors raised while observing one intercepted call.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// A null pointer was passed where valid memory was required.
    #[error("Null pointer passed for {what}")]
    NullPointer {
        /// What the pointer was supposed to reference.
        what: &'static str,
    },

    /// Scratch arena allocation failed.
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),

    /// A memory slice operation failed.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// An observed string was not valid UTF-8.
    #[error("Invalid UTF-8 in observed string: {0}")]
    InvalidUtf8(String),
}

/// Result type alias for capture operations.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
