use crate::browser_dump;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{store, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::Path;

fn import_browser_dump(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let path = str_param(req, "path")?;
    let report = browser_dump::import_file(store, Path::new(path)).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": path }))
    })?;
    Ok(json!(report))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "storage.importBrowserDump" => import_browser_dump(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
