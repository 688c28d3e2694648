//! # Optic - Memory Observation for API Capture/Replay
//!
//! Optic is the per-call memory-observation engine of an API-interception
//! layer that sits between an application and a graphics driver. For every
//! intercepted call, one [`CallObserver`] records which memory ranges the
//! call reads and writes, so a capture/replay system can later reconstruct
//! the exact memory state the call saw and produced.
//!
//! ## Design
//!
//! - **Deferred copies**: `read`/`write` record *where* to look; bytes are
//!   copied once, at materialization. Recording is interval-merge work.
//! - **Coalescing**: overlapping and adjacent ranges merge on insert, so a
//!   range touched many times within one call is observed exactly once.
//! - **Pool-tagged ownership**: every slice carries its memory pool.
//!   Application-owned memory is never mutated by the engine; only
//!   interceptor-owned memory is written directly.
//! - **Call-scoped lifetime**: each observer owns a scratch arena released
//!   in one step when the call ends; nothing call-scoped needs individual
//!   teardown.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        spy / generated glue (external)       │
//! ├──────────────────────────────────────────────┤
//! │              optic (facade)                  │
//! ├──────────────┬───────────────┬───────────────┤
//! │ optic-capture│ optic-observe │ optic-memory  │
//! │ (observer)   │ (ranges,      │ (pools,       │
//! │              │  records)     │  slices)      │
//! ├──────────────┴───────────────┴───────────────┤
//! │              optic-arena                     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use optic::prelude::*;
//!
//! // The spy fixes the capture policy for each observer it creates.
//! let policy = Arc::new(CapturePolicy::new(CaptureConfig::new()));
//!
//! // Application memory an intercepted call is about to read.
//! let mut vertex_data = [1.0f32, 2.0, 3.0];
//! let pool = unsafe {
//!     Pool::application(vertex_data.as_mut_ptr() as *mut u8, 12)
//! };
//! let slice: Slice<f32> = Slice::of_pool(pool);
//!
//! let mut obs = CallObserver::new(policy);
//! obs.set_command_name("glBufferData");
//! obs.read_slice(&slice);
//! obs.observe_reads();
//!
//! // ... forward the real call, then observe_writes(), then the spy
//! // serializes obs.extras() and drops the observer.
//! assert_eq!(obs.extras().len(), 1);
//! ```

// Re-export from sub-crates
pub use optic_arena;
pub use optic_capture;
pub use optic_memory;
pub use optic_observe;

pub use optic_arena::{ArenaConfig, ArenaError, ArenaStats, ScratchArena};
pub use optic_capture::{
    ApiErrorCode, CallObserver, CaptureConfig, CaptureError, CaptureId, CapturePolicy,
    CaptureResult, Spy, NO_ERROR,
};
pub use optic_memory::{MemoryError, Pool, PoolId, PoolKind, Slice};
pub use optic_observe::{Extra, Extras, Observation, Observations, PendingRange, RangeTracker};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use optic::prelude::*;
/// ```
pub mod prelude {
    pub use optic_arena::{ArenaConfig, ScratchArena};
    pub use optic_capture::{CallObserver, CaptureConfig, CapturePolicy, Spy};
    pub use optic_memory::{Pool, PoolKind, Slice};
    pub use optic_observe::{Extra, Observation, Observations};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    fn app_pool(backing: &mut [u8]) -> Arc<Pool> {
        unsafe { Pool::application(backing.as_mut_ptr(), backing.len()) }
    }

    #[test]
    fn test_end_to_end_capture_cycle() {
        let policy = Arc::new(CapturePolicy::new(CaptureConfig::new()));

        // An intercepted call reads 4 bytes of input and writes 4 bytes of
        // output, both in application memory.
        let mut input = [1u8, 2, 3, 4];
        let mut output = [0u8; 4];
        let input_slice: Slice<u8> = Slice::of_pool(app_pool(&mut input));
        let output_slice: Slice<u8> = Slice::of_pool(app_pool(&mut output));

        let mut obs = CallObserver::new(policy);
        obs.set_command_name("glReadPixels");

        // Reads phase.
        obs.read_slice(&input_slice);
        obs.observe_reads();

        // The real call runs and fills the output buffer.
        unsafe {
            std::ptr::copy_nonoverlapping([8u8, 7, 6, 5].as_ptr(), output.as_mut_ptr(), 4);
        }
        obs.set_error(0);

        // Writes phase.
        obs.write_slice(&output_slice);
        obs.observe_writes();

        // The spy pulls the extras for serialization.
        assert_eq!(obs.extras().len(), 1);
        let encoded = obs.extras().encode_all();
        let record = &encoded[0]["data"];
        assert_eq!(record["reads"][0]["data"], serde_json::json!([1, 2, 3, 4]));
        assert_eq!(record["writes"][0]["data"], serde_json::json!([8, 7, 6, 5]));
        assert_eq!(obs.command_name(), Some("glReadPixels"));
    }

    #[test]
    fn test_end_to_end_policy_disabled() {
        let policy = Arc::new(CapturePolicy::new(
            CaptureConfig::new().with_observe_application_pool(false),
        ));

        let mut buf = [1u8, 2, 3, 4];
        let slice: Slice<u8> = Slice::of_pool(app_pool(&mut buf));

        let mut obs = CallObserver::new(policy);
        obs.read_slice(&slice);
        obs.observe_reads();

        assert!(obs.extras().is_empty());
    }

    #[test]
    fn test_end_to_end_clone_and_scratch() {
        let policy = Arc::new(CapturePolicy::new(
            CaptureConfig::new().with_arena(ArenaConfig::new().with_chunk_size(1024)),
        ));

        let mut buf = [11u8, 22, 33];
        let slice: Slice<u8> = Slice::of_pool(app_pool(&mut buf));

        let mut obs = CallObserver::new(policy);
        let stable = obs.clone_slice(&slice).unwrap();

        // Glue code can stage data in call-scoped scratch.
        let staging = obs.scratch().alloc_bytes(64).unwrap();
        staging[..3].copy_from_slice(&stable.to_vec());
        assert_eq!(&staging[..3], &[11, 22, 33]);

        assert_eq!(stable.pool().kind(), PoolKind::Interceptor);
        assert_eq!(stable.to_vec(), vec![11, 22, 33]);
    }
}
