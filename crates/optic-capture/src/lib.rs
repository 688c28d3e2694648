//! Optic Capture - per-call memory observation
//!
//! This crate provides the orchestrating type of the capture engine:
//!
//! - [`CallObserver`]: one instance per intercepted API call; records which
//!   memory ranges the call reads and writes, defers the byte copies, and
//!   materializes them into the call's observation record
//! - [`Spy`] / [`CapturePolicy`]: the policy contract with the interception
//!   layer
//! - [`CaptureConfig`]: per-call capture settings
//!
//! # Call lifecycle
//!
//! ```ignore
//! let mut obs = CallObserver::new(spy);
//! obs.set_command_name("glBufferData");
//!
//! obs.read_slice(&data);        // record what the call will read
//! obs.observe_reads();          // materialize pre-call state
//!
//! let err = forward_real_call();
//! obs.set_error(err);
//!
//! obs.write_slice(&out);        // record what the call wrote
//! obs.observe_writes();         // materialize post-call state
//!
//! serialize(obs.extras());      // the spy pulls the record
//! // drop(obs) releases the arena and everything call-scoped
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod spy;

pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureResult};
pub use observer::{ApiErrorCode, CallObserver, CaptureId, NO_ERROR};
pub use spy::{CapturePolicy, Spy};
