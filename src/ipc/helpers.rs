use crate::branch::BranchScope;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::model::KEY_SELECTED_BRANCH;
use crate::store::RecordStore;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub fn store(state: &AppState) -> Result<&RecordStore, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn str_param<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing params.{}", key)))
}

pub fn opt_str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(Value::as_str)
}

pub fn opt_u64_param(req: &Request, key: &str) -> Result<Option<u64>, HandlerErr> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            HandlerErr::new("bad_params", format!("params.{} must be a non-negative integer", key))
        }),
    }
}

pub fn str_list_param(req: &Request, key: &str) -> Result<Vec<String>, HandlerErr> {
    let bad = || HandlerErr::new("bad_params", format!("params.{} must be an array of strings", key));
    let items = req.params.get(key).and_then(Value::as_array).ok_or_else(bad)?;
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(bad))
        .collect()
}

/// Decodes `params.<key>` as a record. New records may omit `id`.
pub fn record_param<T: DeserializeOwned>(
    req: &Request,
    key: &str,
    is_new: bool,
) -> Result<T, HandlerErr> {
    let Some(mut value) = req.params.get(key).filter(|v| v.is_object()).cloned() else {
        return Err(HandlerErr::new(
            "bad_params",
            format!("params.{} must be an object", key),
        ));
    };
    if is_new {
        if let Some(obj) = value.as_object_mut() {
            obj.entry("id").or_insert_with(|| json!(""));
        }
    }
    serde_json::from_value(value).map_err(|e| {
        HandlerErr::new("bad_params", format!("invalid params.{}: {}", key, e))
    })
}

/// The scope a list call runs in: `params.branchId` when given, otherwise
/// the persisted selection.
pub fn branch_scope(store: &RecordStore, req: &Request) -> BranchScope {
    match req.params.get("branchId") {
        Some(Value::String(id)) => BranchScope::parse(Some(id)),
        _ => {
            let selected: Option<String> = store.load_or(KEY_SELECTED_BRANCH, None);
            BranchScope::parse(selected.as_deref())
        }
    }
}

/// Strips credentials from a serialized record.
pub fn without_secret(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("secret");
        obj.remove("password");
    }
    value
}
