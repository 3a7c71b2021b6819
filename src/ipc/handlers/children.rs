use crate::branch::BranchView;
use crate::directory;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{branch_scope, record_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{Child, Group};
use crate::repo::Repo;
use serde_json::{json, Value};

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let scope = branch_scope(store, req);
    let groups = Repo::<Group>::new(store).list()?;
    let (children, version) = Repo::<Child>::new(store).list_versioned()?;
    let view = BranchView::new(&scope, &groups, &children);
    let mut visible = view.children(&children);
    if let Some(group_id) = req.params.get("groupId").and_then(Value::as_str) {
        visible.retain(|c| c.group_id.as_deref() == Some(group_id));
    }
    Ok(json!({
        "children": visible,
        "version": version,
        "branchId": scope.as_param(),
    }))
}

fn create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let child: Child = record_param(req, "child", true)?;
    Ok(json!({ "child": directory::create_child(store(state)?, child)? }))
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let child: Child = record_param(req, "child", false)?;
    Ok(json!({ "child": directory::update_child(store(state)?, child)? }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = str_param(req, "id")?;
    let removed = directory::delete_child(store(state)?, id)?;
    Ok(json!({ "deleted": removed.id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "children.list" => list(state, req),
        "children.create" => create(state, req),
        "children.update" => update(state, req),
        "children.delete" => delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
