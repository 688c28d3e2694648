//! Pending memory-range tracking.
//!
//! The tracker is the deferred half of an observation: `read`/`write` calls
//! record *where* to look, and only materialization copies *what is there*.
//! Inserting a range is interval-merge work, never a memory copy.

use tracing::trace;

use crate::record::Observation;

/// A half-open byte-address interval `[start, end)` awaiting observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRange {
    /// First byte address of the range.
    pub start: usize,
    /// One past the last byte address of the range.
    pub end: usize,
}

impl PendingRange {
    /// Length of the range in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Ordered set of pending byte-address intervals with merge-on-insert.
///
/// Invariant: no two stored entries overlap or touch; entries are sorted by
/// start address. Inserting the same range twice therefore yields one entry,
/// and adjacent inserts coalesce, so a drain never emits duplicate or
/// fragmented copies of the same bytes.
#[derive(Debug, Default)]
pub struct RangeTracker {
    ranges: Vec<PendingRange>,
}

impl RangeTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[address, address + size)`, merging with any entry it overlaps
    /// or touches. A zero-size insert is a no-op.
    pub fn insert(&mut self, address: usize, size: usize) {
        if size == 0 {
            return;
        }
        let start = address;
        let end = address
            .checked_add(size)
            .expect("range end overflows the address space");

        // First entry that could merge (its end reaches our start), and
        // first entry past any merge (its start is beyond our end). Touching
        // counts as merging in both directions.
        let lo = self.ranges.partition_point(|r| r.end < start);
        let hi = self.ranges.partition_point(|r| r.start <= end);

        if lo == hi {
            self.ranges.insert(lo, PendingRange { start, end });
            trace!(start, end, "Range inserted");
        } else {
            let merged = PendingRange {
                start: start.min(self.ranges[lo].start),
                end: end.max(self.ranges[hi - 1].end),
            };
            self.ranges.splice(lo..hi, std::iter::once(merged));
            trace!(
                start = merged.start,
                end = merged.end,
                absorbed = hi - lo,
                "Range merged"
            );
        }
    }

    /// Number of retained intervals.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the tracker holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate the retained intervals in address order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingRange> {
        self.ranges.iter()
    }

    /// Remove every interval.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Take the retained intervals, leaving the tracker empty.
    pub fn take(&mut self) -> Vec<PendingRange> {
        std::mem::take(&mut self.ranges)
    }

    /// Materialize every retained interval into `out` and empty the tracker.
    ///
    /// Payload bytes are read from live memory *now*, not at insert time;
    /// this is the deferred-copy guarantee. The tracker is emptied even if
    /// it was already empty.
    ///
    /// # Safety
    ///
    /// Every retained range must be valid, initialized, readable memory at
    /// the moment of the call. The ranges were recorded by the caller; this
    /// is its promise to keep them alive until the drain.
    pub unsafe fn drain_into(&mut self, out: &mut Vec<Observation>) {
        let ranges = self.take();
        out.reserve(ranges.len());
        for range in ranges {
            // SAFETY: the caller keeps every recorded range live until the
            // drain.
            out.push(unsafe { Observation::capture(range) });
        }
    }
}
