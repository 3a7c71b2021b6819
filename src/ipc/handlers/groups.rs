use crate::branch::BranchView;
use crate::directory;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{branch_scope, opt_str_param, record_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{Child, Group};
use crate::repo::Repo;
use serde_json::{json, Value};

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let scope = branch_scope(store, req);
    let (groups, version) = Repo::<Group>::new(store).list_versioned()?;
    let children = Repo::<Child>::new(store).list()?;
    let view = BranchView::new(&scope, &groups, &children);
    Ok(json!({
        "groups": view.groups(&groups),
        "version": version,
        "branchId": scope.as_param(),
    }))
}

fn create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let group: Group = record_param(req, "group", true)?;
    Ok(json!({ "group": directory::create_group(store(state)?, group)? }))
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let group: Group = record_param(req, "group", false)?;
    Ok(json!({ "group": directory::update_group(store(state)?, group)? }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = str_param(req, "id")?;
    let removed = directory::delete_group(store(state)?, id)?;
    Ok(json!({ "deleted": removed.id }))
}

/// `teacherId: null` (or absent) leaves the group without a teacher.
fn assign_teacher(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let group_id = str_param(req, "groupId")?;
    let teacher_id = opt_str_param(req, "teacherId")
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let group = directory::assign_teacher(store(state)?, group_id, teacher_id)?;
    Ok(json!({ "group": group }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.list" => list(state, req),
        "groups.create" => create(state, req),
        "groups.update" => update(state, req),
        "groups.delete" => delete(state, req),
        "groups.assignTeacher" => assign_teacher(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
