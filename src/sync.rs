use crate::store::{RecordStore, StoreError};
use serde::Serialize;
use std::collections::BTreeMap;

/// A tracked slot that another writer changed since the last poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotChange {
    pub key: String,
    /// 0 when the slot was removed.
    pub version: u64,
    /// Freshly loaded value; `null` when removed or unreadable.
    pub value: serde_json::Value,
}

/// Remembers the last seen version of each tracked slot and reports writes
/// made by other processes sharing the workspace. There is no merge: the last
/// write to a slot wins, and the tracker only tells its owner to re-read.
#[derive(Debug, Default)]
pub struct SyncTracker {
    seen: BTreeMap<String, u64>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, store: &RecordStore, key: &str) -> Result<u64, StoreError> {
        let version = store.change_version(key)?;
        self.seen.insert(key.to_string(), version);
        Ok(version)
    }

    pub fn unwatch(&mut self, key: &str) -> bool {
        self.seen.remove(key).is_some()
    }

    pub fn watched(&self) -> Vec<String> {
        self.seen.keys().cloned().collect()
    }

    pub fn poll(&mut self, store: &RecordStore) -> Result<Vec<SlotChange>, StoreError> {
        let current = store.stamps()?;
        let mut changes = Vec::new();
        for (key, seen) in self.seen.iter_mut() {
            let Some(stamp) = current.get(key).copied() else {
                continue;
            };
            if stamp.version == *seen {
                continue;
            }
            *seen = stamp.version;
            if store.is_local_write(key, stamp.version) {
                continue;
            }
            let (version, value) = if stamp.removed {
                (0, serde_json::Value::Null)
            } else {
                (stamp.version, store.load_or(key, serde_json::Value::Null))
            };
            changes.push(SlotChange {
                key: key.clone(),
                version,
                value,
            });
        }
        Ok(changes)
    }
}
