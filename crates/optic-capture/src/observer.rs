//! The per-call observer.
//!
//! A [`CallObserver`] is created at the entry of each intercepted API call
//! and dropped when the call returns. Generated glue code drives it: record
//! the ranges the call will read, materialize them, forward the real call,
//! record and materialize the ranges the call wrote. Recording is deferred
//! range tracking; bytes are only copied at materialization.

use std::os::raw::c_char;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use optic_arena::ScratchArena;
use optic_memory::{Pool, Slice};
use optic_observe::{Extra, Extras, Observation, Observations, RangeTracker};

use crate::error::{CaptureError, CaptureResult};
use crate::spy::Spy;

/// API-level error code surfaced by the real intercepted call.
///
/// Stored verbatim, never interpreted; the spy reads it back after the call.
pub type ApiErrorCode = u32;

/// The no-error value of [`ApiErrorCode`].
pub const NO_ERROR: ApiErrorCode = 0;

/// Unique identifier for one captured call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(Uuid);

impl CaptureId {
    /// Create a new random capture ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collects memory observations for one intercepted API call.
///
/// Owned and driven by the single thread executing the call; nothing here
/// suspends, blocks, or shares mutable state with other observers. Dropping
/// the observer releases the scratch arena, and with it everything scoped
/// to the call.
pub struct CallObserver {
    /// The spy that created this observer. Identity token and policy source.
    spy: Arc<dyn Spy>,
    id: CaptureId,
    command_name: Option<&'static str>,
    error: ApiErrorCode,
    /// Policy flag, fixed at construction from the spy.
    observe_application_pool: bool,
    scratch: ScratchArena,
    pending: RangeTracker,
    /// Lazily created; attached to `extras` exactly once per call.
    record: Option<Arc<Mutex<Observations>>>,
    extras: Extras,
    /// Pools holding pending ranges, pinned until the next materialization.
    observed_pools: Vec<Arc<Pool>>,
}

impl CallObserver {
    /// Create an observer for one intercepted call.
    ///
    /// The application-pool policy and arena settings are read from the spy
    /// once, here, and stay fixed for the observer's lifetime.
    pub fn new(spy: Arc<dyn Spy>) -> Self {
        let observe_application_pool = spy.observe_application_pool();
        let scratch = ScratchArena::new(spy.arena_config());
        let id = CaptureId::new();
        debug!(capture = %id, observe_application_pool, "Call observer created");
        Self {
            spy,
            id,
            command_name: None,
            error: NO_ERROR,
            observe_application_pool,
            scratch,
            pending: RangeTracker::new(),
            record: None,
            extras: Extras::new(),
            observed_pools: Vec::new(),
        }
    }

    /// This capture's unique identifier.
    pub fn id(&self) -> CaptureId {
        self.id
    }

    /// The spy that created this observer.
    pub fn spy(&self) -> &Arc<dyn Spy> {
        &self.spy
    }

    /// Set the name of the command being observed.
    ///
    /// The label outlives the observer by contract; generated glue passes
    /// static command-name tables.
    pub fn set_command_name(&mut self, name: &'static str) {
        self.command_name = Some(name);
    }

    /// The name of the command being observed, if set.
    pub fn command_name(&self) -> Option<&'static str> {
        self.command_name
    }

    /// Record the API error code for this call.
    pub fn set_error(&mut self, error: ApiErrorCode) {
        trace!(capture = %self.id, error, "API error recorded");
        self.error = error;
    }

    /// The last recorded API error code for this call.
    pub fn error(&self) -> ApiErrorCode {
        self.error
    }

    /// The call-scoped scratch arena.
    ///
    /// Everything allocated from it dies with the observer.
    pub fn scratch(&self) -> &ScratchArena {
        &self.scratch
    }

    /// Number of pending (unmaterialized) range intervals.
    pub fn pending_ranges(&self) -> usize {
        self.pending.len()
    }

    /// Record `[base, base + size)` as a pending read observation.
    ///
    /// No pool check and no copy: callers decide applicability through the
    /// slice operations, and bytes are captured at materialization.
    ///
    /// # Safety
    ///
    /// The range must remain valid, initialized, readable memory until the
    /// next materialization (`observe_reads`/`observe_writes`/
    /// `observe_into`).
    pub unsafe fn read_raw(&mut self, base: *const u8, size: usize) {
        self.pending.insert(base as usize, size);
    }

    /// Record `[base, base + size)` as a pending write observation.
    ///
    /// # Safety
    ///
    /// Same contract as [`CallObserver::read_raw`].
    pub unsafe fn write_raw(&mut self, base: *const u8, size: usize) {
        self.pending.insert(base as usize, size);
    }

    /// Record the whole extent of `slice` as a read, if policy applies.
    pub fn read_slice<T: Copy>(&mut self, slice: &Slice<T>) {
        if self.should_observe(slice) {
            self.record_range(slice.address(), slice.byte_len(), slice.pool());
        }
    }

    /// Record and return the `index`'th element of `src`.
    ///
    /// The element is returned whether or not the policy gate records it.
    pub fn read_element<T: Copy>(&mut self, src: &Slice<T>, index: usize) -> T {
        let value = src.get(index);
        if self.should_observe(src) {
            let size = std::mem::size_of::<T>();
            self.record_range(src.address() + index * size, size, src.pool());
        }
        value
    }

    /// Record the whole extent of `slice` as a write, if policy applies.
    ///
    /// Only records intent to observe; the actual mutation happens (or
    /// already happened) at the call site.
    pub fn write_slice<T: Copy>(&mut self, slice: &Slice<T>) {
        if self.should_observe(slice) {
            self.record_range(slice.address(), slice.byte_len(), slice.pool());
        }
    }

    /// Write `value` into `dst` at `index`, or record the intent.
    ///
    /// Interceptor-owned destinations are mutated directly; this is the
    /// only path where the engine writes memory on the program's behalf.
    /// Application-owned destinations are never touched: the real API call
    /// performs that write, and the element is recorded as a pending write
    /// observation instead (subject to the policy gate).
    pub fn write_element<T: Copy>(
        &mut self,
        dst: &Slice<T>,
        index: usize,
        value: T,
    ) -> CaptureResult<()> {
        assert!(index < dst.count(), "slice index {index} out of bounds");
        if dst.is_application_pool() {
            if self.should_observe(dst) {
                let size = std::mem::size_of::<T>();
                self.record_range(dst.address() + index * size, size, dst.pool());
            }
        } else {
            dst.set(index, value)?;
        }
        Ok(())
    }

    /// Copy `min(src.count, dst.count)` elements from `src` into `dst`.
    ///
    /// Records `src`'s extent as a read (subject to the policy gate).
    /// Application-owned destinations are not physically copied into.
    /// Truncates silently on length mismatch and returns `dst` either way,
    /// so the call site can still issue a write observation against it.
    pub fn copy<T: Copy>(&mut self, dst: &Slice<T>, src: &Slice<T>) -> CaptureResult<Slice<T>> {
        self.read_slice(src);
        if !dst.is_application_pool() {
            let count = src.count().min(dst.count());
            dst.copy_from(src, count)?;
        }
        Ok(dst.clone())
    }

    /// Record `src` as a read and return a copy in a fresh interceptor pool.
    ///
    /// The returned slice is never application-owned, so later writes to it
    /// are always performed directly.
    pub fn clone_slice<T: Copy>(&mut self, src: &Slice<T>) -> CaptureResult<Slice<T>> {
        let pool = Pool::interceptor(src.byte_len());
        let dst = Slice::of_pool(pool);
        self.copy(&dst, src)
    }

    /// Read a null-terminated string, recording the full span (terminator
    /// included) as one read observation.
    ///
    /// Fails with [`CaptureError::NullPointer`] on a null pointer.
    ///
    /// # Safety
    ///
    /// The scan is unbounded: it walks forward until it finds a zero byte,
    /// so `ptr` must point to a terminated buffer that stays valid through
    /// the next materialization. This mirrors the trust the intercepted
    /// API itself places in such arguments.
    pub unsafe fn c_string(&mut self, ptr: *const c_char) -> CaptureResult<String> {
        if ptr.is_null() {
            return Err(CaptureError::NullPointer {
                what: "null-terminated string",
            });
        }
        let mut len = 0usize;
        // SAFETY: the caller guarantees a terminated, readable buffer.
        while unsafe { ptr.add(len).read() } != 0 {
            len += 1;
        }
        // SAFETY: the span through the terminator is live per the caller's
        // contract, and stays live through the next materialization.
        unsafe { self.read_raw(ptr as *const u8, len + 1) };
        let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CaptureError::InvalidUtf8(e.to_string()))
    }

    /// Read a byte slice as text, recording its full extent as a read.
    ///
    /// No terminator scanning: the slice's bounds are the string's bounds.
    pub fn string_slice(&mut self, slice: &Slice<u8>) -> CaptureResult<String> {
        self.read_slice(slice);
        String::from_utf8(slice.to_bytes())
            .map_err(|e| CaptureError::InvalidUtf8(e.to_string()))
    }

    /// Materialize pending ranges into the record's read list.
    ///
    /// A no-op when nothing is pending; the record is only created (and
    /// attached to the extras, once per call) on first need.
    pub fn observe_reads(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let record = self.record_handle();
        let mut guard = record.lock();
        let before = guard.reads.len();
        // SAFETY: gated slice operations only record application-pool
        // ranges, valid per `Pool::application`'s contract; raw ranges are
        // valid per `read_raw`/`write_raw`'s contract; pools of recorded
        // slices are pinned in `observed_pools` until this drain.
        unsafe { self.pending.drain_into(&mut guard.reads) };
        self.observed_pools.clear();
        debug!(
            capture = %self.id,
            observations = guard.reads.len() - before,
            "Read observations materialized"
        );
    }

    /// Materialize pending ranges into the record's write list.
    ///
    /// Same contract as [`CallObserver::observe_reads`].
    pub fn observe_writes(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let record = self.record_handle();
        let mut guard = record.lock();
        let before = guard.writes.len();
        // SAFETY: as in observe_reads.
        unsafe { self.pending.drain_into(&mut guard.writes) };
        self.observed_pools.clear();
        debug!(
            capture = %self.id,
            observations = guard.writes.len() - before,
            "Write observations materialized"
        );
    }

    /// Materialize pending ranges into an arbitrary list.
    ///
    /// Always leaves the tracker empty, even if it already was.
    pub fn observe_into(&mut self, out: &mut Vec<Observation>) {
        // SAFETY: as in observe_reads.
        unsafe { self.pending.drain_into(out) };
        self.observed_pools.clear();
    }

    /// The extras attached to this call so far, in append order.
    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    /// Append a metadata entry to this call's extras.
    pub fn add_extra(&mut self, extra: Arc<dyn Extra>) {
        self.extras.push(extra);
    }

    /// True when the observation record has been created and attached.
    pub fn record_attached(&self) -> bool {
        self.record.is_some()
    }

    fn should_observe<T: Copy>(&self, slice: &Slice<T>) -> bool {
        self.observe_application_pool && slice.is_application_pool()
    }

    fn record_range(&mut self, address: usize, size: usize, pool: &Arc<Pool>) {
        self.pending.insert(address, size);
        self.observed_pools.push(Arc::clone(pool));
    }

    fn record_handle(&mut self) -> Arc<Mutex<Observations>> {
        if let Some(record) = &self.record {
            return Arc::clone(record);
        }
        let record = Arc::new(Mutex::new(Observations::new()));
        self.extras.push(Arc::clone(&record) as Arc<dyn Extra>);
        self.record = Some(Arc::clone(&record));
        trace!(capture = %self.id, "Observation record attached to extras");
        record
    }
}

impl Drop for CallObserver {
    fn drop(&mut self) {
        debug!(
            capture = %self.id,
            command = self.command_name.unwrap_or(""),
            arena_bytes = self.scratch.bytes_allocated(),
            extras = self.extras.len(),
            "Call observer destroyed"
        );
    }
}

impl std::fmt::Debug for CallObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallObserver")
            .field("id", &self.id)
            .field("command", &self.command_name)
            .field("error", &self.error)
            .field("observe_application_pool", &self.observe_application_pool)
            .field("pending_ranges", &self.pending.len())
            .field("extras", &self.extras.len())
            .finish()
    }
}
