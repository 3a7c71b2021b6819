mod support;

use serde_json::{json, Value};
use support::{temp_dir, Sidecar};

fn id_of(result: &Value, kind: &str) -> String {
    result[kind]["id"].as_str().expect("created id").to_string()
}

fn ids(list: &Value) -> Vec<String> {
    list.as_array()
        .expect("array")
        .iter()
        .map(|v| v["id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn children_with_credentials_get_parent_accounts() {
    let workspace = temp_dir("kindergarten-children-parents");
    let mut s = Sidecar::open(&workspace);

    let a = s.request_ok(
        "children.create",
        json!({ "child": { "name": "Aziz", "login": "ota", "password": "p-1", "parentName": "Karim" } }),
    );
    let a_id = a["child"]["id"].as_str().expect("child id").to_string();

    let accounts = s.request_ok("accounts.list", json!({}))["accounts"].clone();
    let parents: Vec<&Value> = accounts
        .as_array()
        .expect("accounts")
        .iter()
        .filter(|a| a["role"] == "parent")
        .collect();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0]["childIds"], json!([a_id]));
    assert_eq!(parents[0]["displayName"], "Karim");

    // A sibling with the same parent credentials joins the same account.
    let b = s.request_ok(
        "children.create",
        json!({ "child": { "name": "Zarina", "login": "ota", "password": "P-1" } }),
    );
    let b_id = b["child"]["id"].as_str().expect("child id").to_string();
    let accounts = s.request_ok("accounts.list", json!({}))["accounts"].clone();
    assert_eq!(accounts.as_array().expect("accounts").len(), 1);
    assert_eq!(accounts[0]["childIds"], json!([a_id, b_id]));

    // Same login with another secret belongs to someone else.
    assert_eq!(
        s.request_err(
            "children.create",
            json!({ "child": { "name": "Olim", "login": "ota", "password": "other" } }),
        ),
        "username_taken"
    );
    assert_eq!(
        ids(&s.request_ok("children.list", json!({}))["children"]).len(),
        2,
        "failed create must not leave a child behind"
    );

    let login = s.request_ok("auth.login", json!({ "secretCode": "p-1", "username": "ota" }));
    assert_eq!(login["session"]["role"], "parent");
    assert_eq!(login["session"]["childNames"], json!(["Aziz", "Zarina"]));

    s.request_ok("children.delete", json!({ "id": a_id }));
    let accounts = s.request_ok("accounts.list", json!({}))["accounts"].clone();
    assert_eq!(accounts[0]["childIds"], json!([b_id]));
    s.request_ok("children.delete", json!({ "id": b_id }));
    let accounts = s.request_ok("accounts.list", json!({}))["accounts"].clone();
    assert!(accounts.as_array().expect("accounts").is_empty());

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn deleting_a_teacher_removes_only_their_account_and_group_links() {
    let workspace = temp_dir("kindergarten-teacher-delete");
    let mut s = Sidecar::open(&workspace);

    let g = s.request_ok("groups.create", json!({ "group": { "name": "Kapalak" } }));
    let g_id = g["group"]["id"].as_str().expect("group id").to_string();
    let t1 = s.request_ok(
        "teachers.create",
        json!({ "teacher": { "name": "Dilnoza", "username": "dilnoza", "password": "t-1", "assignedGroups": [g_id] } }),
    );
    let t1_id = t1["teacher"]["id"].as_str().expect("teacher id").to_string();
    s.request_ok(
        "teachers.create",
        json!({ "teacher": { "name": "Nodira", "username": "nodira", "password": "t-2" } }),
    );

    let groups = s.request_ok("groups.list", json!({}))["groups"].clone();
    assert_eq!(groups[0]["teacherId"], json!(t1_id));

    s.request_ok("teachers.delete", json!({ "id": t1_id }));

    let accounts = s.request_ok("accounts.list", json!({}))["accounts"].clone();
    let names: Vec<&str> = accounts
        .as_array()
        .expect("accounts")
        .iter()
        .map(|a| a["username"].as_str().expect("username"))
        .collect();
    assert_eq!(names, vec!["nodira"]);
    let groups = s.request_ok("groups.list", json!({}))["groups"].clone();
    assert!(groups[0]["teacherId"].is_null());
    assert_eq!(
        s.request_err("auth.login", json!({ "secretCode": "t-1", "username": "dilnoza" })),
        "auth_failed"
    );

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn assigning_a_teacher_updates_both_sides() {
    let workspace = temp_dir("kindergarten-assign-teacher");
    let mut s = Sidecar::open(&workspace);

    let g = s.request_ok("groups.create", json!({ "group": { "name": "Lola" } }));
    let g_id = g["group"]["id"].as_str().expect("group id").to_string();
    let t1 = s.request_ok("teachers.create", json!({ "teacher": { "name": "A" } }));
    let t1_id = t1["teacher"]["id"].as_str().expect("id").to_string();
    let t2 = s.request_ok("teachers.create", json!({ "teacher": { "name": "B" } }));
    let t2_id = t2["teacher"]["id"].as_str().expect("id").to_string();

    s.request_ok("groups.assignTeacher", json!({ "groupId": g_id, "teacherId": t1_id }));
    s.request_ok("groups.assignTeacher", json!({ "groupId": g_id, "teacherId": t2_id }));

    let teachers = s.request_ok("teachers.list", json!({}))["teachers"].clone();
    for t in teachers.as_array().expect("teachers") {
        let assigned = t["assignedGroups"].as_array().expect("assigned");
        if t["id"] == json!(t2_id) {
            assert_eq!(assigned, &vec![json!(g_id)]);
            assert_eq!(t["groupNames"], json!(["Lola"]));
        } else {
            assert!(assigned.is_empty());
        }
    }

    let cleared = s.request_ok("groups.assignTeacher", json!({ "groupId": g_id, "teacherId": null }));
    assert!(cleared["group"]["teacherId"].is_null());
    assert_eq!(
        s.request_err("groups.assignTeacher", json!({ "groupId": g_id, "teacherId": "ghost" })),
        "invalid_reference"
    );

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn references_are_checked_and_branches_with_groups_survive() {
    let workspace = temp_dir("kindergarten-references");
    let mut s = Sidecar::open(&workspace);

    assert_eq!(
        s.request_err("children.create", json!({ "child": { "name": "X", "groupId": "missing" } })),
        "invalid_reference"
    );
    let b = s.request_ok("branches.create", json!({ "branch": { "name": "Yunusobod" } }));
    let b_id = b["branch"]["id"].as_str().expect("branch id").to_string();
    s.request_ok("groups.create", json!({ "group": { "name": "G", "branchId": b_id } }));
    assert_eq!(s.request_err("branches.delete", json!({ "id": b_id })), "branch_in_use");
    assert_eq!(s.request_err("groups.delete", json!({ "id": "missing" })), "not_found");
    assert_eq!(s.request_err("branches.create", json!({ "branch": { "name": "  " } })), "bad_params");

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn branch_selection_scopes_lists() {
    let workspace = temp_dir("kindergarten-branch-scope");
    let mut s = Sidecar::open(&workspace);

    let b1 = id_of(&s.request_ok("branches.create", json!({ "branch": { "name": "B1" } })), "branch");
    let b2 = id_of(&s.request_ok("branches.create", json!({ "branch": { "name": "B2" } })), "branch");
    let g1 = id_of(
        &s.request_ok("groups.create", json!({ "group": { "name": "G1", "branchId": b1 } })),
        "group",
    );
    let g2 = id_of(
        &s.request_ok("groups.create", json!({ "group": { "name": "G2", "branchId": b2 } })),
        "group",
    );
    let c1 = s.request_ok("children.create", json!({ "child": { "name": "C1", "groupId": g1 } }))["child"].clone();
    assert_eq!(c1["branchId"], json!(b1));
    s.request_ok("children.create", json!({ "child": { "name": "C2", "groupId": g2 } }));

    s.request_ok(
        "records.create",
        json!({ "collection": "vaccines", "record": { "childId": c1["id"], "vaccine": "BCG", "date": "2024-01-10" } }),
    );
    s.request_ok(
        "records.create",
        json!({ "collection": "meals", "record": { "date": "2024-01-10", "groupId": g2, "menu": "Osh" } }),
    );

    s.request_ok("branch.select", json!({ "branchId": b1 }));
    assert_eq!(s.request_ok("branch.current", json!({}))["branch"]["name"], "B1");
    let children = s.request_ok("children.list", json!({}))["children"].clone();
    assert_eq!(ids(&children), vec![c1["id"].as_str().expect("id").to_string()]);
    let vaccines = s.request_ok("records.list", json!({ "collection": "vaccines" }))["records"].clone();
    assert_eq!(vaccines.as_array().expect("records").len(), 1);
    let meals = s.request_ok("records.list", json!({ "collection": "meals" }))["records"].clone();
    assert!(meals.as_array().expect("records").is_empty());

    // An explicit branchId overrides the selection.
    let meals = s.request_ok("records.list", json!({ "collection": "meals", "branchId": "all" }))
        ["records"]
        .clone();
    assert_eq!(meals.as_array().expect("records").len(), 1);

    assert_eq!(s.request_err("branch.select", json!({ "branchId": "nope" })), "not_found");
    s.request_ok("branch.select", json!({ "branchId": "all" }));
    let children = s.request_ok("children.list", json!({}))["children"].clone();
    assert_eq!(children.as_array().expect("children").len(), 2);

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn clearing_child_credentials_ends_the_parent_login() {
    let workspace = temp_dir("kindergarten-clear-credentials");
    let mut s = Sidecar::open(&workspace);

    let c = s.request_ok(
        "children.create",
        json!({ "child": { "name": "Aziz", "login": "ota", "password": "p-1" } }),
    )["child"]
        .clone();
    let mut cleared = c.clone();
    cleared["login"] = Value::Null;
    cleared["password"] = Value::Null;
    s.request_ok("children.update", json!({ "child": cleared }));

    let accounts = s.request_ok("accounts.list", json!({}))["accounts"].clone();
    assert!(accounts.as_array().expect("accounts").is_empty());
    assert_eq!(
        s.request_err("auth.login", json!({ "secretCode": "p-1", "username": "ota" })),
        "auth_failed"
    );

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reused_ids_and_second_teacher_accounts_are_rejected() {
    let workspace = temp_dir("kindergarten-duplicate-ids");
    let mut s = Sidecar::open(&workspace);

    s.request_ok("children.create", json!({ "child": { "id": "c1", "name": "A" } }));
    assert_eq!(
        s.request_err("children.create", json!({ "child": { "id": "c1", "name": "B" } })),
        "bad_params"
    );
    assert_eq!(ids(&s.request_ok("children.list", json!({}))["children"]), vec!["c1"]);

    let n = json!({ "notification": { "id": "n1", "userId": "u1", "title": "Hi", "date": "2024-01-01" } });
    s.request_ok("notifications.create", n.clone());
    assert_eq!(s.request_err("notifications.create", n), "bad_params");

    let t = id_of(
        &s.request_ok(
            "teachers.create",
            json!({ "teacher": { "name": "Olga", "username": "olga", "password": "t-1" } }),
        ),
        "teacher",
    );
    assert_eq!(
        s.request_err(
            "accounts.create",
            json!({ "account": { "username": "olga2", "secret": "t-2", "role": "teacher", "teacherId": t } }),
        ),
        "bad_params"
    );

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn branch_still_holding_children_is_not_deleted() {
    let workspace = temp_dir("kindergarten-branch-children");
    let mut s = Sidecar::open(&workspace);

    let b = id_of(&s.request_ok("branches.create", json!({ "branch": { "name": "B" } })), "branch");
    let c = id_of(
        &s.request_ok("children.create", json!({ "child": { "name": "A", "branchId": b } })),
        "child",
    );
    let resp = s.request("branches.delete", json!({ "id": b }));
    assert_eq!(resp["error"]["code"], "branch_in_use");
    assert_eq!(resp["error"]["details"]["usedBy"], "children");

    s.request_ok("children.delete", json!({ "id": c }));
    s.request_ok("branches.delete", json!({ "id": b }));

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}
