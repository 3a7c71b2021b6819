use crate::auth;
use crate::branch::{BranchScope, BranchView};
use crate::directory;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{branch_scope, record_param, store, str_param, without_secret};
use crate::ipc::types::{AppState, Request};
use crate::model::{Account, Child, Group, Role};
use crate::repo::Repo;
use crate::settings::auth_settings;
use serde_json::{json, Value};

fn account_json(account: &Account) -> Result<Value, HandlerErr> {
    let value = serde_json::to_value(account)
        .map_err(|e| HandlerErr::new("encode_failed", e.to_string()))?;
    Ok(without_secret(value))
}

fn login(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let secret = req
        .params
        .get("secretCode")
        .or_else(|| req.params.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let username = req
        .params
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("");
    let settings = auth_settings(store, &state.config);
    let session = auth::login(store, &settings, secret, username)?;
    Ok(json!({ "session": session }))
}

fn logout(state: &AppState) -> Result<Value, HandlerErr> {
    let removed = auth::logout(store(state)?)?;
    Ok(json!({ "loggedOut": removed }))
}

fn session(state: &AppState) -> Result<Value, HandlerErr> {
    Ok(json!({ "session": auth::current_session(store(state)?) }))
}

/// Parent accounts follow the branch scope through their children; staff
/// accounts are always listed.
fn accounts_list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let scope = branch_scope(store, req);
    let accounts = Repo::<Account>::new(store).list()?;
    let visible: Vec<&Account> = match &scope {
        BranchScope::All => accounts.iter().collect(),
        BranchScope::Branch(_) => {
            let groups = Repo::<Group>::new(store).list()?;
            let children = Repo::<Child>::new(store).list()?;
            let view = BranchView::new(&scope, &groups, &children);
            let parents = view.parents(&accounts);
            accounts
                .iter()
                .filter(|a| a.role != Role::Parent || parents.iter().any(|p| p.id == a.id))
                .collect()
        }
    };
    let rows = visible
        .into_iter()
        .map(account_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "accounts": rows, "branchId": scope.as_param() }))
}

fn accounts_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let account: Account = record_param(req, "account", true)?;
    let created = directory::create_account(store(state)?, account)?;
    Ok(json!({ "account": account_json(&created)? }))
}

fn accounts_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    // The secret may be left out to keep the current one.
    let mut patch = req.params.clone();
    if let Some(obj) = patch.get_mut("account").and_then(Value::as_object_mut) {
        if !obj.contains_key("secret") && !obj.contains_key("password") {
            let id = obj.get("id").and_then(Value::as_str).unwrap_or("");
            if let Some(existing) = Repo::<Account>::new(store).get(id)? {
                obj.insert("secret".into(), Value::String(existing.secret));
            }
        }
    }
    let patched = Request {
        params: patch,
        ..req.clone()
    };
    let account: Account = record_param(&patched, "account", false)?;
    let updated = directory::update_account(store, account)?;
    Ok(json!({ "account": account_json(&updated)? }))
}

fn accounts_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = str_param(req, "id")?;
    let removed = directory::delete_account(store(state)?, id)?;
    Ok(json!({ "deleted": removed.id }))
}

fn accounts_link_child(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let account_id = str_param(req, "accountId")?;
    let child_id = str_param(req, "childId")?;
    let account = directory::link_child(store(state)?, account_id, child_id)?;
    Ok(json!({ "account": account_json(&account)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.login" => login(state, req),
        "auth.logout" => logout(state),
        "auth.session" => session(state),
        "accounts.list" => accounts_list(state, req),
        "accounts.create" => accounts_create(state, req),
        "accounts.update" => accounts_update(state, req),
        "accounts.delete" => accounts_delete(state, req),
        "accounts.linkChild" => accounts_link_child(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
