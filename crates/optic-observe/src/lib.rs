//! Optic Observe - deferred memory observation
//!
//! This crate provides the observation machinery of the capture engine:
//!
//! - [`RangeTracker`]: ordered pending-range set with merge-on-insert
//! - [`Observation`] / [`Observations`]: materialized address + payload records
//! - [`Extra`] / [`Extras`]: the per-call serializable metadata bag
//!
//! The cost model is the point: recording a range is interval-merge work,
//! and the bytes are copied once, at materialization time.
//!
//! # Example
//!
//! ```
//! use optic_observe::RangeTracker;
//!
//! let buf = [1u8, 2, 3, 4];
//! let mut tracker = RangeTracker::new();
//! tracker.insert(buf.as_ptr() as usize, 2);
//! tracker.insert(buf.as_ptr() as usize + 2, 2); // coalesces
//! assert_eq!(tracker.len(), 1);
//!
//! let mut out = Vec::new();
//! unsafe { tracker.drain_into(&mut out) };
//! assert_eq!(out[0].data.as_ref(), &[1, 2, 3, 4]);
//! ```

pub mod extras;
pub mod ranges;
pub mod record;

pub use extras::{Extra, Extras};
pub use ranges::{PendingRange, RangeTracker};
pub use record::{Observation, Observations};
