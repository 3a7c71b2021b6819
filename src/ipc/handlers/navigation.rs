use crate::auth::session_state;
use crate::guard::{self, SessionState, ROUTES};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn check(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let path = str_param(req, "path")?;
    // A UI that has not read the session yet reports itself as loading.
    let loading = req
        .params
        .get("loading")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let session = if loading {
        SessionState::Loading
    } else {
        session_state(state.store.as_ref())
    };
    let decision = guard::check(session, path);
    let mut out = serde_json::to_value(&decision)
        .map_err(|e| HandlerErr::new("encode_failed", e.to_string()))?;
    out["path"] = json!(path);
    Ok(out)
}

fn routes() -> Value {
    let rows: Vec<Value> = ROUTES
        .iter()
        .map(|r| {
            json!({
                "prefix": r.prefix,
                "roles": r.roles,
            })
        })
        .collect();
    json!({ "login": guard::LOGIN_PATH, "routes": rows })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "nav.check" => check(state, req),
        "nav.routes" => Ok(routes()),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
