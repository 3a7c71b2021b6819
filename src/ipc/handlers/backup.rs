use crate::backup;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn workspace_of(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let out_path = str_param(req, "outPath")?;
    let workspace = workspace_of(state)?;
    let summary = backup::export_workspace_bundle(&workspace, Path::new(out_path)).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;
    info!(path = out_path, sha256 = %summary.db_sha256, "workspace exported");
    Ok(json!({
        "path": out_path,
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "dbSha256": summary.db_sha256,
    }))
}

/// Replaces the current workspace database with the bundle's and reopens it.
fn import(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let in_path = str_param(req, "inPath")?;
    let workspace = workspace_of(state)?;
    let src = Path::new(in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop open handle before replacing file.
    state.store = None;
    let imported = backup::import_workspace_bundle(src, &workspace);
    // Reopen whatever is on disk now, restored or not.
    let reopened = open_workspace(state, &workspace);

    let summary = imported.map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;
    if let Err(e) = reopened {
        warn!(error = %e, "restored workspace failed to open");
        return Err(HandlerErr::new("db_open_failed", format!("{e:#}")));
    }
    info!(path = in_path, format = %summary.bundle_format_detected, "workspace restored");
    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
        "dbSha256": summary.db_sha256,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.export" => export(state, req),
        "backup.import" => import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
