//! Materialized observation records.
//!
//! An [`Observation`] is an address plus the bytes that were there at
//! materialization time. One [`Observations`] record per intercepted call
//! collects them, split into the ranges the call read and the ranges it
//! wrote.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ranges::PendingRange;

/// One materialized memory range: address plus captured payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Base byte address the payload was captured from.
    pub address: u64,
    /// The bytes at `address` at materialization time.
    pub data: Bytes,
}

impl Observation {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Capture the live bytes of `range` at this moment.
    ///
    /// # Safety
    ///
    /// `range` must denote valid, initialized, readable memory.
    pub unsafe fn capture(range: PendingRange) -> Self {
        // SAFETY: the range is live and readable per the caller's contract.
        let bytes =
            unsafe { std::slice::from_raw_parts(range.start as *const u8, range.len()) };
        Self {
            address: range.start as u64,
            data: Bytes::copy_from_slice(bytes),
        }
    }
}

/// The per-call observation record: everything one intercepted call read
/// and wrote, as materialized address/payload pairs.
///
/// At most one record exists per call; repeated materializations append
/// into the same record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observations {
    /// Ranges the call read, in materialization order.
    pub reads: Vec<Observation>,
    /// Ranges the call wrote, in materialization order.
    pub writes: Vec<Observation>,
}

impl Observations {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the record holds no observations at all.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Total payload bytes across read observations.
    pub fn read_bytes(&self) -> usize {
        self.reads.iter().map(Observation::size).sum()
    }

    /// Total payload bytes across write observations.
    pub fn write_bytes(&self) -> usize {
        self.writes.iter().map(Observation::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_copies_payload() {
        let buf = [1u8, 2, 3];
        let range = PendingRange {
            start: buf.as_ptr() as usize,
            end: buf.as_ptr() as usize + 3,
        };
        let obs = unsafe { Observation::capture(range) };
        assert_eq!(obs.address, buf.as_ptr() as u64);
        assert_eq!(obs.size(), 3);
        assert_eq!(obs.data.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_byte_totals() {
        let mut record = Observations::new();
        assert!(record.is_empty());

        record.reads.push(Observation {
            address: 0x1000,
            data: Bytes::from_static(&[0; 8]),
        });
        record.writes.push(Observation {
            address: 0x2000,
            data: Bytes::from_static(&[0; 3]),
        });

        assert!(!record.is_empty());
        assert_eq!(record.read_bytes(), 8);
        assert_eq!(record.write_bytes(), 3);
    }

    #[test]
    fn test_record_serializes() {
        let mut record = Observations::new();
        record.reads.push(Observation {
            address: 16,
            data: Bytes::from_static(&[0xFF]),
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["reads"][0]["address"], 16);
    }
}
