//! Optic Arena - call-scoped scratch allocation
//!
//! This crate provides the bump allocator that backs temporary storage for
//! one intercepted API call:
//!
//! - [`ScratchArena`]: chunked bump allocator, released in one step on drop
//! - [`ArenaConfig`]: slab size and capacity settings
//! - [`ArenaStats`]: allocation statistics snapshot
//!
//! # Example
//!
//! ```
//! use optic_arena::{ArenaConfig, ScratchArena};
//!
//! let arena = ScratchArena::new(ArenaConfig::new().with_chunk_size(4096));
//! let staging = arena.alloc_bytes(128).unwrap();
//! staging[0] = 0x7F;
//! // Dropping the arena releases every allocation at once.
//! ```

pub mod arena;
pub mod error;

pub use arena::{ArenaConfig, ArenaStats, ScratchArena};
pub use error::{ArenaError, ArenaResult};
