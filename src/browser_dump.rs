//! Import of a browser storage export: a JSON object mapping storage keys to
//! the serialized JSON text the console kept under each key.
//!
//! Collections are decoded into their typed records before anything is
//! written; records that fail to decode are reported and skipped.
//! Event records that point at a child by display name are re-pointed at the
//! child's id when the name is unambiguous.

use crate::model::{
    Account, Activity, AttendanceDay, Branch, Child, Complaint, Group, Homework, Meal,
    Notification, Record, SleepRecord, StorageItem, Teacher, Vaccination, KEY_SESSION,
};
use crate::settings::{self, SettingsSection};
use crate::store::RecordStore;
use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedKey {
    pub key: String,
    pub records: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: Vec<ImportedKey>,
    pub warnings: Vec<String>,
}

/// Keys in the order they are imported; children come before the records
/// that refer to them by name.
const ORDER: &[&str] = &[
    "branches",
    "groups",
    "teachers",
    "children",
    "auth_users",
    "meals",
    "vaccines",
    "activities",
    "complaints",
    "attendance",
    "homework",
    "sleep",
    "storage",
    "notifications",
];

const CHILD_NAME_FIELDS: &[&str] = &["childName", "child", "studentName"];
const APPEARANCE_KEYS: &[&str] = &["theme", "darkMode", "language"];

pub fn import_file(store: &RecordStore, path: &Path) -> anyhow::Result<ImportReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let dump: Map<String, Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON object", path.to_string_lossy()))?;
    Ok(import_dump(store, dump))
}

/// Storage exports hold JSON text per key; accept already-parsed values too.
fn unwrap_text(value: Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(s) => match serde_json::from_str(&s) {
            Ok(v) => Ok(v),
            // Plain strings such as a theme name are stored unquoted.
            Err(_) if !s.trim_start().starts_with(['[', '{']) => Ok(Value::String(s)),
            Err(e) => Err(e),
        },
        other => Ok(other),
    }
}

pub fn import_dump(store: &RecordStore, mut dump: Map<String, Value>) -> ImportReport {
    let mut report = ImportReport::default();

    for key in ORDER {
        let Some(raw) = dump.remove(*key) else {
            continue;
        };
        let value = match unwrap_text(raw) {
            Ok(v) => v,
            Err(e) => {
                report.warnings.push(format!("{}: not valid JSON: {}", key, e));
                continue;
            }
        };
        let value = if matches!(*key, "meals" | "vaccines" | "activities" | "complaints" | "sleep")
        {
            resolve_child_names(store, key, value, &mut report.warnings)
        } else {
            value
        };
        let warnings = &mut report.warnings;
        let imported = match *key {
            "branches" => import_collection::<Branch>(store, key, value, warnings),
            "groups" => import_collection::<Group>(store, key, value, warnings),
            "teachers" => import_collection::<Teacher>(store, key, value, warnings),
            "children" => import_collection::<Child>(store, key, value, warnings),
            "auth_users" => import_collection::<Account>(store, key, value, warnings),
            "meals" => import_collection::<Meal>(store, key, value, warnings),
            "vaccines" => import_collection::<Vaccination>(store, key, value, warnings),
            "activities" => import_collection::<Activity>(store, key, value, warnings),
            "complaints" => import_collection::<Complaint>(store, key, value, warnings),
            "attendance" => import_collection::<AttendanceDay>(store, key, value, warnings),
            "homework" => import_collection::<Homework>(store, key, value, warnings),
            "sleep" => import_collection::<SleepRecord>(store, key, value, warnings),
            "storage" => import_collection::<StorageItem>(store, key, value, warnings),
            "notifications" => import_collection::<Notification>(store, key, value, warnings),
            _ => None,
        };
        if let Some(records) = imported {
            report.imported.push(ImportedKey {
                key: key.to_string(),
                records,
            });
        }
    }

    let mut appearance = Map::new();
    for key in APPEARANCE_KEYS {
        if let Some(raw) = dump.remove(*key) {
            match unwrap_text(raw) {
                Ok(v) => {
                    appearance.insert(key.to_string(), v);
                }
                Err(e) => report.warnings.push(format!("{}: {}", key, e)),
            }
        }
    }
    if !appearance.is_empty() {
        match settings::update_section(store, SettingsSection::Appearance, &appearance) {
            Ok(_) => report.imported.push(ImportedKey {
                key: SettingsSection::Appearance.key().to_string(),
                records: appearance.len(),
            }),
            Err(e) => report.warnings.push(format!("appearance settings: {}", e)),
        }
    }

    if dump.remove(KEY_SESSION).is_some() {
        report
            .warnings
            .push(format!("{}: sessions are not imported", KEY_SESSION));
    }
    for key in dump.keys() {
        report
            .warnings
            .push(format!("{}: unknown key, skipped", key));
    }

    info!(
        imported = report.imported.len(),
        warnings = report.warnings.len(),
        "browser storage dump imported"
    );
    report
}

/// Decodes record by record; records that do not decode are skipped with a
/// warning. Nothing is written when no record survives.
fn import_collection<T: Record>(
    store: &RecordStore,
    key: &str,
    value: Value,
    warnings: &mut Vec<String>,
) -> Option<usize> {
    let Value::Array(items) = value else {
        warnings.push(format!("{}: expected a JSON array", key));
        return None;
    };
    let total = items.len();
    let mut records: Vec<T> = Vec::with_capacity(total);
    for (idx, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(r) => records.push(r),
            Err(e) => warnings.push(format!("{}[{}]: skipped: {}", key, idx, e)),
        }
    }
    if records.is_empty() && total > 0 {
        return None;
    }
    if let Err(e) = store.save(T::KEY, &records) {
        warnings.push(format!("{}: {}", key, e));
        return None;
    }
    Some(records.len())
}

/// Fills in `childId` on records that only name their child.
fn resolve_child_names(
    store: &RecordStore,
    key: &str,
    mut value: Value,
    warnings: &mut Vec<String>,
) -> Value {
    let children: Vec<Child> = store.load_or(Child::KEY, Vec::new());
    let mut by_name: HashMap<String, Vec<&str>> = HashMap::new();
    for c in &children {
        by_name
            .entry(c.name.trim().to_lowercase())
            .or_default()
            .push(c.id.as_str());
    }

    let Some(items) = value.as_array_mut() else {
        return value;
    };
    for (idx, item) in items.iter_mut().enumerate() {
        let Some(obj) = item.as_object_mut() else {
            continue;
        };
        if obj.get("childId").is_some_and(|v| !v.is_null()) {
            continue;
        }
        let Some(name) = CHILD_NAME_FIELDS
            .iter()
            .find_map(|f| obj.get(*f).and_then(Value::as_str))
            .map(|s| s.trim().to_lowercase())
        else {
            continue;
        };
        match by_name.get(&name).map(Vec::as_slice) {
            Some([id]) => {
                obj.insert("childId".to_string(), Value::String(id.to_string()));
            }
            Some(ids) if ids.len() > 1 => {
                warn!(key, idx, "child name is ambiguous");
                warnings.push(format!("{}[{}]: child name {:?} matches {} children", key, idx, name, ids.len()));
            }
            _ => warnings.push(format!("{}[{}]: no child named {:?}", key, idx, name)),
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repo;
    use serde_json::json;

    fn dump(v: Value) -> Map<String, Value> {
        v.as_object().expect("object").clone()
    }

    #[test]
    fn collections_are_decoded_and_child_names_resolved() {
        let store = RecordStore::in_memory();
        let children = json!([{ "id": 11, "name": "Aziz", "groupId": 2 }]).to_string();
        let vaccines = json!([
            { "id": 1, "childName": "aziz ", "vaccine": "BCG", "date": "2024-02-01" }
        ])
        .to_string();
        let report = import_dump(
            &store,
            dump(json!({
                "children": children,
                "vaccines": vaccines,
                "language": "ru",
                "currentUser": "{}"
            })),
        );

        let v = Repo::<Vaccination>::new(&store).list().expect("vaccines");
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].child_id, "11");
        assert_eq!(
            settings::load_section(&store, SettingsSection::Appearance)["language"],
            "ru"
        );
        assert!(report.warnings.iter().any(|w| w.starts_with("currentUser")));
    }

    #[test]
    fn undecodable_key_is_reported_and_not_written() {
        let store = RecordStore::in_memory();
        let report = import_dump(
            &store,
            dump(json!({
                "groups": "[{\"name\": 5}]",
                "teachers": "[oops",
                "mystery": "1"
            })),
        );
        assert!(report.imported.is_empty());
        assert_eq!(report.warnings.len(), 3);
        assert!(store.load_raw("groups").expect("raw").is_none());
    }
}
