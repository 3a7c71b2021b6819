mod support;

use serde_json::json;
use support::{temp_dir, Sidecar};

#[test]
fn demo_codes_are_off_unless_enabled() {
    let workspace = temp_dir("kindergarten-auth-demo");
    let mut s = Sidecar::open(&workspace);

    let code = s.request_err("auth.login", json!({ "secretCode": "ADMIN-DEMO", "username": "x" }));
    assert_eq!(code, "auth_failed");
    assert!(s.request_ok("auth.session", json!({}))["session"].is_null());

    s.request_ok(
        "settings.update",
        json!({ "section": "auth", "patch": { "demoCodesEnabled": true } }),
    );
    let login = s.request_ok("auth.login", json!({ "secretCode": " admin-demo ", "username": "Malika" }));
    assert_eq!(login["session"]["role"], "admin");
    assert_eq!(login["session"]["demo"], true);
    assert_eq!(login["session"]["displayName"], "Malika");

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn env_override_wins_over_stored_setting() {
    let workspace = temp_dir("kindergarten-auth-env");
    {
        let mut s = Sidecar::open(&workspace);
        s.request_ok(
            "settings.update",
            json!({ "section": "auth", "patch": { "demoCodesEnabled": true } }),
        );
    }
    let mut s = Sidecar::spawn_with_env(&[
        ("KINDERGARTEND_DEMO_CODES", "0"),
        ("KINDERGARTEND_WORKSPACE", workspace.to_str().expect("utf8 path")),
    ]);
    let settings = s.request_ok("settings.get", json!({}));
    assert_eq!(settings["sections"]["auth"]["demoCodesEnabled"], true);
    assert_eq!(settings["effective"]["demoCodesEnabled"], false);
    assert_eq!(
        s.request_err("auth.login", json!({ "secretCode": "DIRECTOR-DEMO" })),
        "auth_failed"
    );

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn stored_accounts_log_in_and_session_survives_restart() {
    let workspace = temp_dir("kindergarten-auth-accounts");
    let mut s = Sidecar::open(&workspace);

    let created = s.request_ok(
        "accounts.create",
        json!({ "account": { "username": "direktor", "secret": "d-4411", "role": "director", "displayName": "Rustam" } }),
    );
    assert!(created["account"].get("secret").is_none());
    assert_eq!(
        s.request_err(
            "accounts.create",
            json!({ "account": { "username": "DIREKTOR", "secret": "x", "role": "admin" } }),
        ),
        "username_taken"
    );

    // Unknown user and wrong secret look the same.
    let unknown = s.request("auth.login", json!({ "secretCode": "d-4411", "username": "nobody" }));
    let wrong = s.request("auth.login", json!({ "secretCode": "nope", "username": "direktor" }));
    assert_eq!(unknown["error"]["code"], "auth_failed");
    assert_eq!(unknown["error"]["message"], wrong["error"]["message"]);

    let login = s.request_ok("auth.login", json!({ "secretCode": "D-4411", "username": " direktor " }));
    assert_eq!(login["session"]["role"], "director");
    assert_eq!(login["session"]["displayName"], "Rustam");

    let listed = s.request_ok("accounts.list", json!({}));
    let accounts = listed["accounts"].as_array().expect("accounts");
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].get("secret").is_none());
    drop(s);

    let mut s = Sidecar::open(&workspace);
    let session = s.request_ok("auth.session", json!({}));
    assert_eq!(session["session"]["username"], "direktor");
    let d = s.request_ok("nav.check", json!({ "path": "/login" }));
    assert_eq!(d["to"], "/director/dashboard");

    let out = s.request_ok("auth.logout", json!({}));
    assert_eq!(out["loggedOut"], true);
    assert!(s.request_ok("auth.session", json!({}))["session"].is_null());

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn account_update_without_secret_keeps_the_old_one() {
    let workspace = temp_dir("kindergarten-auth-update");
    let mut s = Sidecar::open(&workspace);
    let created = s.request_ok(
        "accounts.create",
        json!({ "account": { "username": "admin1", "secret": "a-1", "role": "admin" } }),
    );
    let id = created["account"]["id"].as_str().expect("id").to_string();
    s.request_ok(
        "accounts.update",
        json!({ "account": { "id": id, "username": "admin1", "role": "admin", "displayName": "Bosh" } }),
    );
    let login = s.request_ok("auth.login", json!({ "secretCode": "a-1", "username": "admin1" }));
    assert_eq!(login["session"]["displayName"], "Bosh");

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}
