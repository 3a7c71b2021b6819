use crate::auth::current_session;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{opt_str_param, record_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::Notification;
use crate::repo::Repo;
use crate::store::RecordStore;
use serde_json::{json, Value};

/// `params.userId`, else the logged-in user.
fn target_user(store: &RecordStore, req: &Request) -> Result<String, HandlerErr> {
    if let Some(id) = opt_str_param(req, "userId").filter(|s| !s.trim().is_empty()) {
        return Ok(id.trim().to_string());
    }
    current_session(store)
        .map(|s| s.id)
        .ok_or_else(|| HandlerErr::new("bad_params", "missing params.userId and no session"))
}

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let user_id = target_user(store, req)?;
    let unread_only = req
        .params
        .get("unreadOnly")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let (all, version) = Repo::<Notification>::new(store).list_versioned()?;
    let mut mine: Vec<&Notification> = all
        .iter()
        .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
        .collect();
    mine.sort_by(|a, b| b.date.cmp(&a.date));
    let unread = mine.iter().filter(|n| !n.read).count();
    Ok(json!({
        "notifications": mine,
        "unread": unread,
        "version": version,
    }))
}

fn create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut notification: Notification = record_param(req, "notification", true)?;
    if notification.date.trim().is_empty() {
        notification.date = chrono::Utc::now().to_rfc3339();
    }
    let created = Repo::<Notification>::new(store(state)?).insert(notification)?;
    Ok(json!({ "notification": created }))
}

fn mark_read(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let id = str_param(req, "id")?;
    let repo = Repo::<Notification>::new(store);
    let Some(mut n) = repo.get(id)? else {
        return Err(HandlerErr::new("not_found", format!("notification not found: {}", id)));
    };
    if !n.read {
        n.read = true;
        repo.update(&n)?;
    }
    Ok(json!({ "notification": n }))
}

fn mark_all_read(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let user_id = target_user(store, req)?;
    let repo = Repo::<Notification>::new(store);
    let mut all = repo.list()?;
    let mut marked = 0usize;
    for n in all.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
        n.read = true;
        marked += 1;
    }
    if marked > 0 {
        repo.replace_all(&all)?;
    }
    Ok(json!({ "marked": marked }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = str_param(req, "id")?;
    match Repo::<Notification>::new(store(state)?).remove(id)? {
        Some(n) => Ok(json!({ "deleted": n.id })),
        None => Err(HandlerErr::new("not_found", format!("notification not found: {}", id))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notifications.list" => list(state, req),
        "notifications.create" => create(state, req),
        "notifications.markRead" => mark_read(state, req),
        "notifications.markAllRead" => mark_all_read(state, req),
        "notifications.delete" => delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
