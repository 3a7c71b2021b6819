use crate::branch::BranchView;
use crate::directory;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{branch_scope, record_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{Child, Group, Teacher};
use crate::repo::Repo;
use serde_json::{json, Value};

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let scope = branch_scope(store, req);
    let groups = Repo::<Group>::new(store).list()?;
    let children = Repo::<Child>::new(store).list()?;
    let (teachers, version) = Repo::<Teacher>::new(store).list_versioned()?;
    let view = BranchView::new(&scope, &groups, &children);
    let rows: Vec<Value> = view
        .teachers(&teachers)
        .into_iter()
        .map(|t| {
            let led: Vec<String> = directory::teacher_groups(&groups, t)
                .into_iter()
                .map(|g| g.name)
                .collect();
            let mut row = json!(t);
            row["groupNames"] = json!(led);
            row
        })
        .collect();
    Ok(json!({
        "teachers": rows,
        "version": version,
        "branchId": scope.as_param(),
    }))
}

fn create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let teacher: Teacher = record_param(req, "teacher", true)?;
    Ok(json!({ "teacher": directory::create_teacher(store(state)?, teacher)? }))
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let teacher: Teacher = record_param(req, "teacher", false)?;
    Ok(json!({ "teacher": directory::update_teacher(store(state)?, teacher)? }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = str_param(req, "id")?;
    let removed = directory::delete_teacher(store(state)?, id)?;
    Ok(json!({ "deleted": removed.id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => list(state, req),
        "teachers.create" => create(state, req),
        "teachers.update" => update(state, req),
        "teachers.delete" => delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
