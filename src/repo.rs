use crate::model::Record;
use crate::store::{RecordStore, StoreError};
use std::collections::HashMap;
use std::marker::PhantomData;

/// One collection slot viewed as a list of `T`.
///
/// Every operation reads the whole collection and every mutation rewrites it.
/// Reads are strict: a slot that does not decode as `Vec<T>` is an error, not
/// an empty list.
pub struct Repo<'a, T: Record> {
    store: &'a RecordStore,
    _marker: PhantomData<T>,
}

impl<'a, T: Record> Repo<'a, T> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.list_versioned()?.0)
    }

    pub fn list_versioned(&self) -> Result<(Vec<T>, u64), StoreError> {
        Ok(self
            .store
            .load::<Vec<T>>(T::KEY)?
            .map(|v| (v.value, v.version))
            .unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.list()?.into_iter().find(|r| r.id() == id))
    }

    pub fn index(&self) -> Result<HashMap<String, T>, StoreError> {
        Ok(index_by_id(self.list()?))
    }

    pub fn replace_all(&self, records: &[T]) -> Result<u64, StoreError> {
        self.store.save(T::KEY, records)
    }

    /// Appends `record`, assigning a fresh id when it has none. A given id
    /// must not be in use yet.
    pub fn insert(&self, mut record: T) -> Result<T, StoreError> {
        let mut all = self.list()?;
        if record.id().trim().is_empty() {
            record.set_id(uuid::Uuid::new_v4().to_string());
        } else if all.iter().any(|r| r.id() == record.id()) {
            return Err(StoreError::DuplicateId {
                key: T::KEY.to_string(),
                id: record.id().to_string(),
            });
        }
        all.push(record.clone());
        self.store.save(T::KEY, &all)?;
        Ok(record)
    }

    /// Replaces the record with the same id. Returns false when there is none.
    pub fn update(&self, record: &T) -> Result<bool, StoreError> {
        self.update_checked(record, None)
    }

    /// Like `update`, but fails with a conflict when the collection moved past
    /// `expected_version`.
    pub fn update_checked(&self, record: &T, expected_version: Option<u64>) -> Result<bool, StoreError> {
        let (mut all, version) = self.list_versioned()?;
        let Some(slot) = all.iter_mut().find(|r| r.id() == record.id()) else {
            return Ok(false);
        };
        *slot = record.clone();
        match expected_version {
            Some(expected) => self.store.save_if(T::KEY, &all, expected)?,
            None => self.store.save_if(T::KEY, &all, version)?,
        };
        Ok(true)
    }

    pub fn remove(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.remove_checked(id, None)
    }

    pub fn remove_checked(&self, id: &str, expected_version: Option<u64>) -> Result<Option<T>, StoreError> {
        let (mut all, version) = self.list_versioned()?;
        let Some(pos) = all.iter().position(|r| r.id() == id) else {
            return Ok(None);
        };
        let removed = all.remove(pos);
        self.store
            .save_if(T::KEY, &all, expected_version.unwrap_or(version))?;
        Ok(Some(removed))
    }

    /// Removes every record matching `pred` and returns them.
    pub fn remove_where(&self, pred: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        let all = self.list()?;
        let (removed, kept): (Vec<T>, Vec<T>) = all.into_iter().partition(|r| pred(r));
        if !removed.is_empty() {
            self.store.save(T::KEY, &kept)?;
        }
        Ok(removed)
    }
}

pub fn index_by_id<T: Record>(records: Vec<T>) -> HashMap<String, T> {
    records
        .into_iter()
        .map(|r| (r.id().to_string(), r))
        .collect()
}
