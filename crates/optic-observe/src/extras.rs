//! Per-call metadata extras.
//!
//! Extras are opaque serializable entries attached to a captured call:
//! the observation record is one, per-API metadata from generated glue code
//! can be others. The spy serializes them after the call, in append order.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::Observations;

/// An opaque serializable metadata entry attached to a captured call.
pub trait Extra: Send + Sync + std::fmt::Debug {
    /// Stable tag identifying the entry's type on the wire.
    fn kind(&self) -> &'static str;

    /// Encode the entry for serialization.
    fn encode(&self) -> serde_json::Value;
}

/// The observation record is shared between the call observer (which keeps
/// appending across materializations) and the extras bag (which serializes
/// it once at call end), so it lives behind a mutex.
impl Extra for Mutex<Observations> {
    fn kind(&self) -> &'static str {
        "memory_observations"
    }

    fn encode(&self) -> serde_json::Value {
        serde_json::to_value(&*self.lock()).unwrap_or(serde_json::Value::Null)
    }
}

/// Append-only ordered bag of extras for one captured call.
///
/// Append order is preserved and is the order entries serialize in.
#[derive(Debug, Default)]
pub struct Extras {
    entries: Vec<Arc<dyn Extra>>,
}

impl Extras {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, entry: Arc<dyn Extra>) {
        self.entries.push(entry);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in append order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Extra>> {
        self.entries.iter()
    }

    /// Encode every entry, in append order, as `{kind, data}` objects.
    pub fn encode_all(&self) -> Vec<serde_json::Value> {
        self.entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "kind": entry.kind(),
                    "data": entry.encode(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Observation;
    use bytes::Bytes;

    #[derive(Debug)]
    struct Label(&'static str);

    impl Extra for Label {
        fn kind(&self) -> &'static str {
            "label"
        }

        fn encode(&self) -> serde_json::Value {
            serde_json::Value::String(self.0.to_string())
        }
    }

    #[test]
    fn test_append_order_preserved() {
        let mut extras = Extras::new();
        extras.push(Arc::new(Label("first")));
        extras.push(Arc::new(Label("second")));

        let encoded = extras.encode_all();
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[0]["data"], "first");
        assert_eq!(encoded[1]["data"], "second");
    }

    #[test]
    fn test_shared_record_encodes_latest_state() {
        let record = Arc::new(Mutex::new(Observations::new()));
        let mut extras = Extras::new();
        extras.push(Arc::clone(&record) as Arc<dyn Extra>);

        // Appending after attachment must be visible at encode time.
        record.lock().reads.push(Observation {
            address: 0x40,
            data: Bytes::from_static(&[1, 2]),
        });

        let encoded = extras.encode_all();
        assert_eq!(encoded[0]["kind"], "memory_observations");
        assert_eq!(encoded[0]["data"]["reads"][0]["address"], 0x40);
    }
}
