//! Versioned key-value slots holding whole JSON collections.
//!
//! Each slot stores one serialized value (usually an array of records) and the
//! workspace-wide write sequence number at which it was last written. A missing
//! slot has version 0.

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failed: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("slot {key} does not hold a valid value: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for slot {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("slot {key} changed: expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("{key} already holds a record with id {id}")]
    DuplicateId { key: String, id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub value: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// The last change to a slot: the version it was written at, or the version
/// its removal was stamped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStamp {
    pub version: u64,
    pub removed: bool,
}

/// Raw slot access. Implementations must hand out strictly increasing
/// versions across all keys and removals, so no two changes ever share a
/// version an observer could confuse.
pub trait SlotStore {
    fn read_slot(&self, key: &str) -> Result<Option<Slot>, StoreError>;
    /// Overwrites the slot. With `expected`, fails with `Conflict` unless the
    /// current version (0 when absent) matches.
    fn write_slot(&self, key: &str, value: &str, expected: Option<u64>)
        -> Result<u64, StoreError>;
    /// Deletes the slot and returns the version stamped on the removal, or
    /// `None` when there was nothing to delete.
    fn remove_slot(&self, key: &str) -> Result<Option<u64>, StoreError>;
    fn stamp(&self, key: &str) -> Result<Option<SlotStamp>, StoreError>;
    /// Stamps of live slots and of removed ones.
    fn stamps(&self) -> Result<BTreeMap<String, SlotStamp>, StoreError>;
    /// Keeps a copy of an undecodable value. Quarantining the same value for
    /// the same key twice keeps one copy.
    fn quarantine(&self, key: &str, value: &str, reason: &str) -> Result<(), StoreError>;
    fn begin(&self) -> Result<(), StoreError>;
    fn commit(&self) -> Result<(), StoreError>;
    fn rollback(&self) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn write_inner(&self, key: &str, value: &str, expected: Option<u64>) -> Result<u64, StoreError> {
        let current: Option<i64> = self
            .conn
            .query_row("SELECT version FROM slots WHERE key = ?", [key], |r| r.get(0))
            .optional()?;
        let actual = current.unwrap_or(0) as u64;
        if let Some(expected) = expected {
            if expected != actual {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }
        }

        let version = self.next_seq()?;
        self.conn.execute(
            "INSERT INTO slots(key, value, version, updated_at) VALUES(?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               version = excluded.version,
               updated_at = excluded.updated_at",
            (key, value, version as i64, chrono::Utc::now().to_rfc3339()),
        )?;
        self.conn
            .execute("DELETE FROM slot_tombstones WHERE key = ?", [key])?;
        Ok(version)
    }

    fn remove_inner(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let n = self.conn.execute("DELETE FROM slots WHERE key = ?", [key])?;
        if n == 0 {
            return Ok(None);
        }
        let version = self.next_seq()?;
        self.conn.execute(
            "INSERT INTO slot_tombstones(key, version, removed_at) VALUES(?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               version = excluded.version,
               removed_at = excluded.removed_at",
            (key, version as i64, chrono::Utc::now().to_rfc3339()),
        )?;
        Ok(Some(version))
    }

    fn next_seq(&self) -> Result<u64, StoreError> {
        self.conn
            .execute("UPDATE store_meta SET value = value + 1 WHERE name = 'seq'", [])?;
        let version: i64 = self.conn.query_row(
            "SELECT value FROM store_meta WHERE name = 'seq'",
            [],
            |r| r.get(0),
        )?;
        Ok(version as u64)
    }

    /// Runs `f` under the write lock so the version check, the sequence bump
    /// and the write cannot interleave with another process. Joins a
    /// transaction the caller already holds.
    fn locked<R>(&self, f: impl FnOnce(&Self) -> Result<R, StoreError>) -> Result<R, StoreError> {
        let own_tx = self.conn.is_autocommit();
        if own_tx {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        let result = f(self);
        if own_tx {
            match &result {
                Ok(_) => self.conn.execute_batch("COMMIT")?,
                Err(_) => {
                    let _ = self.conn.execute_batch("ROLLBACK");
                }
            }
        }
        result
    }
}

impl SlotStore for SqliteStore {
    fn read_slot(&self, key: &str) -> Result<Option<Slot>, StoreError> {
        let slot = self
            .conn
            .query_row(
                "SELECT value, version FROM slots WHERE key = ?",
                [key],
                |r| {
                    Ok(Slot {
                        value: r.get(0)?,
                        version: r.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(slot)
    }

    fn write_slot(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.locked(|s| s.write_inner(key, value, expected))
    }

    fn remove_slot(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.locked(|s| s.remove_inner(key))
    }

    fn stamp(&self, key: &str) -> Result<Option<SlotStamp>, StoreError> {
        if let Some(slot) = self.read_slot(key)? {
            return Ok(Some(SlotStamp {
                version: slot.version,
                removed: false,
            }));
        }
        let removed: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM slot_tombstones WHERE key = ?",
                [key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(removed.map(|v| SlotStamp {
            version: v as u64,
            removed: true,
        }))
    }

    fn stamps(&self) -> Result<BTreeMap<String, SlotStamp>, StoreError> {
        let mut out = BTreeMap::new();
        for (sql, removed) in [
            ("SELECT key, version FROM slot_tombstones", true),
            ("SELECT key, version FROM slots", false),
        ] {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
                .collect::<Result<Vec<_>, _>>()?;
            for (key, version) in rows {
                out.insert(key, SlotStamp { version, removed });
            }
        }
        Ok(out)
    }

    fn quarantine(&self, key: &str, value: &str, reason: &str) -> Result<(), StoreError> {
        let known: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM slot_quarantine WHERE key = ? AND value = ? LIMIT 1",
                [key, value],
                |r| r.get(0),
            )
            .optional()?;
        if known.is_some() {
            return Ok(());
        }
        self.conn.execute(
            "INSERT INTO slot_quarantine(id, key, value, reason, quarantined_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                uuid::Uuid::new_v4().to_string(),
                key,
                value,
                reason,
                chrono::Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedSlot {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// In-process backend for unit tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    slots: RefCell<BTreeMap<String, Slot>>,
    tombstones: RefCell<BTreeMap<String, u64>>,
    seq: Cell<u64>,
    quarantined: RefCell<Vec<QuarantinedSlot>>,
    snapshot: RefCell<Option<MemorySnapshot>>,
}

#[cfg(test)]
struct MemorySnapshot {
    slots: BTreeMap<String, Slot>,
    tombstones: BTreeMap<String, u64>,
    seq: u64,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quarantined(&self) -> Vec<QuarantinedSlot> {
        self.quarantined.borrow().clone()
    }
}

#[cfg(test)]
impl SlotStore for MemoryStore {
    fn read_slot(&self, key: &str) -> Result<Option<Slot>, StoreError> {
        Ok(self.slots.borrow().get(key).cloned())
    }

    fn write_slot(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut slots = self.slots.borrow_mut();
        let actual = slots.get(key).map(|s| s.version).unwrap_or(0);
        if let Some(expected) = expected {
            if expected != actual {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }
        }
        let version = self.seq.get() + 1;
        self.seq.set(version);
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                version,
            },
        );
        self.tombstones.borrow_mut().remove(key);
        Ok(version)
    }

    fn remove_slot(&self, key: &str) -> Result<Option<u64>, StoreError> {
        if self.slots.borrow_mut().remove(key).is_none() {
            return Ok(None);
        }
        let version = self.seq.get() + 1;
        self.seq.set(version);
        self.tombstones.borrow_mut().insert(key.to_string(), version);
        Ok(Some(version))
    }

    fn stamp(&self, key: &str) -> Result<Option<SlotStamp>, StoreError> {
        Ok(self.stamps()?.get(key).copied())
    }

    fn stamps(&self) -> Result<BTreeMap<String, SlotStamp>, StoreError> {
        let mut out: BTreeMap<String, SlotStamp> = self
            .tombstones
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), SlotStamp { version: *v, removed: true }))
            .collect();
        for (k, s) in self.slots.borrow().iter() {
            out.insert(
                k.clone(),
                SlotStamp {
                    version: s.version,
                    removed: false,
                },
            );
        }
        Ok(out)
    }

    fn quarantine(&self, key: &str, value: &str, reason: &str) -> Result<(), StoreError> {
        let mut quarantined = self.quarantined.borrow_mut();
        if quarantined.iter().any(|q| q.key == key && q.value == value) {
            return Ok(());
        }
        quarantined.push(QuarantinedSlot {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn begin(&self) -> Result<(), StoreError> {
        *self.snapshot.borrow_mut() = Some(MemorySnapshot {
            slots: self.slots.borrow().clone(),
            tombstones: self.tombstones.borrow().clone(),
            seq: self.seq.get(),
        });
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.snapshot.borrow_mut().take();
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        // Like SQLite, a rolled back unit also gives back its versions.
        if let Some(saved) = self.snapshot.borrow_mut().take() {
            *self.slots.borrow_mut() = saved.slots;
            *self.tombstones.borrow_mut() = saved.tombstones;
            self.seq.set(saved.seq);
        }
        Ok(())
    }
}

/// Typed access to slots, plus bookkeeping of which versions this process
/// wrote itself (see [`crate::sync::SyncTracker`]).
pub struct RecordStore {
    backend: Box<dyn SlotStore>,
    local_writes: RefCell<HashMap<String, u64>>,
    tx_depth: Cell<u32>,
}

impl RecordStore {
    pub fn new(backend: impl SlotStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            local_writes: RefCell::new(HashMap::new()),
            tx_depth: Cell::new(0),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn load_raw(&self, key: &str) -> Result<Option<Slot>, StoreError> {
        self.backend.read_slot(key)
    }

    /// Strict read: a value that does not decode as `T` is an error.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Versioned<T>>, StoreError> {
        let Some(slot) = self.backend.read_slot(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&slot.value).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(Versioned {
            value,
            version: slot.version,
        }))
    }

    /// Lenient read: missing and corrupt slots both yield `default`. A corrupt
    /// value is copied to quarantine first so it can be recovered by hand.
    pub fn load_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let slot = match self.backend.read_slot(key) {
            Ok(Some(slot)) => slot,
            Ok(None) => return default,
            Err(e) => {
                warn!(key, error = %e, "slot read failed, using default");
                return default;
            }
        };
        match serde_json::from_str(&slot.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, version = slot.version, error = %e, "slot is corrupt, using default");
                if let Err(qe) = self.backend.quarantine(key, &slot.value, &e.to_string()) {
                    warn!(key, error = %qe, "failed to quarantine corrupt slot");
                }
                default
            }
        }
    }

    pub fn version_of(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.backend.read_slot(key)?.map(|s| s.version).unwrap_or(0))
    }

    /// Version of the last write or removal of `key`; 0 when it never existed.
    pub fn change_version(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.backend.stamp(key)?.map(|s| s.version).unwrap_or(0))
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<u64, StoreError> {
        self.write(key, value, None)
    }

    /// Optimistic write: fails with `StoreError::Conflict` when the slot moved
    /// past `expected` since the caller read it.
    pub fn save_if<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expected: u64,
    ) -> Result<u64, StoreError> {
        self.write(key, value, Some(expected))
    }

    fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let version = self.backend.write_slot(key, &raw, expected)?;
        self.local_writes.borrow_mut().insert(key.to_string(), version);
        debug!(key, version, bytes = raw.len(), "slot written");
        Ok(version)
    }

    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let stamp = self.backend.remove_slot(key)?;
        if let Some(version) = stamp {
            self.local_writes.borrow_mut().insert(key.to_string(), version);
        }
        debug!(key, removed = stamp.is_some(), version = ?stamp, "slot removed");
        Ok(stamp.is_some())
    }

    pub fn stamps(&self) -> Result<BTreeMap<String, SlotStamp>, StoreError> {
        self.backend.stamps()
    }

    /// True when `version` of `key` is the last change this process made there.
    pub fn is_local_write(&self, key: &str, version: u64) -> bool {
        self.local_writes.borrow().get(key) == Some(&version)
    }

    /// Runs `f` so that all slot writes inside it land together or not at all.
    /// Nested calls join the outermost unit.
    pub fn atomically<R, E>(&self, f: impl FnOnce(&Self) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        if self.tx_depth.get() > 0 {
            return f(self);
        }
        // Versions handed out inside a rolled back unit are reused by the
        // next writer, so they must not stay marked as ours.
        let local_before = self.local_writes.borrow().clone();
        self.backend.begin()?;
        self.tx_depth.set(1);
        let result = f(self);
        self.tx_depth.set(0);
        match result {
            Ok(v) => {
                self.backend.commit()?;
                Ok(v)
            }
            Err(e) => {
                if let Err(re) = self.backend.rollback() {
                    warn!(error = %re, "rollback failed");
                }
                *self.local_writes.borrow_mut() = local_before;
                Err(e)
            }
        }
    }
}
