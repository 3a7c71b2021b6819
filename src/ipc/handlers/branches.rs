use crate::branch::BranchScope;
use crate::directory;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{branch_scope, opt_str_param, record_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{Branch, KEY_SELECTED_BRANCH};
use crate::repo::Repo;
use serde_json::{json, Value};
use tracing::info;

fn select(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let scope = BranchScope::parse(opt_str_param(req, "branchId"));
    if let BranchScope::Branch(id) = &scope {
        if Repo::<Branch>::new(store).get(id)?.is_none() {
            return Err(HandlerErr::new("not_found", format!("branch not found: {}", id))
                .with_details(json!({ "kind": "branch", "id": id })));
        }
    }
    store.save(KEY_SELECTED_BRANCH, scope.as_param())?;
    info!(branch = scope.as_param(), "branch selected");
    Ok(json!({ "branchId": scope.as_param() }))
}

fn current(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let scope = branch_scope(store, req);
    let branch = match &scope {
        BranchScope::All => None,
        BranchScope::Branch(id) => Repo::<Branch>::new(store).get(id)?,
    };
    Ok(json!({ "branchId": scope.as_param(), "branch": branch }))
}

fn list(state: &AppState) -> Result<Value, HandlerErr> {
    let (branches, version) = Repo::<Branch>::new(store(state)?).list_versioned()?;
    Ok(json!({ "branches": branches, "version": version }))
}

fn create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let branch: Branch = record_param(req, "branch", true)?;
    Ok(json!({ "branch": directory::create_branch(store(state)?, branch)? }))
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let branch: Branch = record_param(req, "branch", false)?;
    Ok(json!({ "branch": directory::update_branch(store(state)?, branch)? }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let id = str_param(req, "id")?;
    let removed = directory::delete_branch(store, id)?;
    // A selection pointing at a deleted branch falls back to every branch.
    let selected: Option<String> = store.load_or(KEY_SELECTED_BRANCH, None);
    if selected.as_deref() == Some(removed.id.as_str()) {
        store.save(KEY_SELECTED_BRANCH, BranchScope::All.as_param())?;
    }
    Ok(json!({ "deleted": removed.id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "branch.select" => select(state, req),
        "branch.current" => current(state, req),
        "branches.list" => list(state),
        "branches.create" => create(state, req),
        "branches.update" => update(state, req),
        "branches.delete" => delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
