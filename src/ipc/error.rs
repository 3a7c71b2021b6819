use crate::auth::AuthError;
use crate::directory::DirectoryError;
use crate::settings::SettingsError;
use crate::store::StoreError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Turns a handler result into the response line for `id`.
pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::Backend(_) => HandlerErr::new("db_query_failed", message),
            StoreError::Decode { key, .. } => {
                HandlerErr::new("decode_failed", message).with_details(json!({ "key": key }))
            }
            StoreError::Encode { key, .. } => {
                HandlerErr::new("encode_failed", message).with_details(json!({ "key": key }))
            }
            StoreError::Conflict {
                key,
                expected,
                actual,
            } => HandlerErr::new("version_conflict", message).with_details(json!({
                "key": key,
                "expectedVersion": expected,
                "actualVersion": actual,
            })),
            StoreError::DuplicateId { key, id } => HandlerErr::new("bad_params", message)
                .with_details(json!({ "collection": key, "id": id })),
        }
    }
}

impl From<DirectoryError> for HandlerErr {
    fn from(e: DirectoryError) -> Self {
        let message = e.to_string();
        match e {
            DirectoryError::Store(inner) => inner.into(),
            DirectoryError::NotFound { kind, id } => {
                HandlerErr::new("not_found", message).with_details(json!({ "kind": kind, "id": id }))
            }
            DirectoryError::UsernameTaken(username) => HandlerErr::new("username_taken", message)
                .with_details(json!({ "username": username })),
            DirectoryError::InvalidReference { field, kind, id } => {
                HandlerErr::new("invalid_reference", message)
                    .with_details(json!({ "field": field, "kind": kind, "id": id }))
            }
            DirectoryError::BranchInUse { id, used_by } => HandlerErr::new("branch_in_use", message)
                .with_details(json!({ "branchId": id, "usedBy": used_by })),
            DirectoryError::Invalid(_) => HandlerErr::new("bad_params", message),
        }
    }
}

impl From<AuthError> for HandlerErr {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => HandlerErr::new("auth_failed", e.to_string()),
            AuthError::Store(inner) => inner.into(),
        }
    }
}

impl From<SettingsError> for HandlerErr {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Invalid(message) => HandlerErr::new("bad_params", message),
            SettingsError::Store(inner) => inner.into(),
        }
    }
}
