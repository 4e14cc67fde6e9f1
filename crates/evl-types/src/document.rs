use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::event::ClusterEvent;

/// The record EVL writes to the ledger for one cluster event.
///
/// `id` is always the event's uid. Submitting the same event any number of
/// times therefore addresses the same ledger record, which lets the ledger's
/// PUT-by-id upsert absorb duplicate and out-of-order deliveries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub id: String,
    pub event: ClusterEvent,
}

impl LedgerDocument {
    /// Derive the document for a fetched event snapshot.
    ///
    /// Fails when the event has no uid: an empty key would collapse
    /// unrelated events into a single ledger record.
    pub fn from_event(event: ClusterEvent) -> Result<Self, TypeError> {
        if event.uid().is_empty() {
            return Err(TypeError::MissingUid {
                name: event.namespaced_name().to_string(),
            });
        }
        Ok(Self {
            id: event.uid().to_string(),
            event,
        })
    }

    /// Compact JSON encoding with `id` first, then `event`.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Hex BLAKE3 digest of the canonical encoding, for log correlation.
    pub fn digest(&self) -> Result<String, TypeError> {
        let bytes = self.to_canonical_json()?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }
}
