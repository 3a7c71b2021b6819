use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::navigation::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::branches::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::groups::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::children::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::teachers::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::records::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::notifications::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::sync::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::settings::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::storage::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
