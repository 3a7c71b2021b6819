use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::str_list_param;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

fn watch(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let keys = str_list_param(req, "keys")?;
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let mut versions = Map::new();
    for key in keys {
        let version = state.sync.watch(store, &key)?;
        versions.insert(key, json!(version));
    }
    Ok(json!({ "versions": versions }))
}

fn unwatch(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let keys = str_list_param(req, "keys")?;
    for key in &keys {
        state.sync.unwatch(key);
    }
    Ok(json!({ "watched": state.sync.watched() }))
}

fn poll(state: &mut AppState) -> Result<Value, HandlerErr> {
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let changes = state.sync.poll(store)?;
    Ok(json!({ "changes": changes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sync.watch" => watch(state, req),
        "sync.unwatch" => unwatch(state, req),
        "sync.poll" => poll(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
