//! Login resolution and the persisted session.
//!
//! Credentials are shared plain-text codes, compared as stored. This is an
//! identification step for a single-device console, not authentication
//! against an adversary.

use crate::directory::teacher_groups;
use crate::model::{
    Account, Child, Group, Role, SessionUser, Teacher, KEY_ACCOUNTS, KEY_SESSION,
};
use crate::guard::SessionState;
use crate::repo::{index_by_id, Repo};
use crate::settings::AuthSettings;
use crate::store::{RecordStore, StoreError};
use tracing::{info, warn};

/// The only failure message a caller ever sees for bad credentials.
pub const LOGIN_FAILED_MESSAGE: &str = "invalid login or code";

/// Fixed bootstrap codes, honored only while demo codes are enabled.
pub const DEMO_CODES: &[(&str, Role)] = &[
    ("ADMIN-DEMO", Role::Admin),
    ("DIRECTOR-DEMO", Role::Director),
    ("TEACHER-DEMO", Role::Teacher),
    ("PARENT-DEMO", Role::Parent),
];

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid login or code")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn normalize_secret(secret: &str) -> String {
    secret.trim().to_uppercase()
}

pub fn secrets_match(stored: &str, given: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        normalize_secret(stored) == normalize_secret(given)
    } else {
        stored.trim() == given.trim()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn session_from_account(store: &RecordStore, account: &Account) -> Result<SessionUser, StoreError> {
    let mut session = SessionUser {
        id: account.id.clone(),
        username: account.username.clone(),
        role: account.role,
        display_name: account.display_name.clone(),
        teacher_id: account.teacher_id.clone(),
        child_ids: account.child_ids.clone(),
        branch_id: account.branch_id.clone(),
        group_ids: Vec::new(),
        group_names: Vec::new(),
        child_names: Vec::new(),
        demo: false,
        logged_in_at: now(),
    };

    // Refresh display data from the linked records as of now; later edits to
    // those records do not reach an existing session.
    match account.role {
        Role::Teacher => {
            let Some(teacher_id) = account.teacher_id.as_deref() else {
                return Ok(session);
            };
            let Some(teacher) = Repo::<Teacher>::new(store).get(teacher_id)? else {
                warn!(account_id = %account.id, teacher_id, "teacher account points at a missing teacher");
                return Ok(session);
            };
            let groups = teacher_groups(&Repo::<Group>::new(store).list()?, &teacher);
            session.display_name = teacher.name.clone();
            session.branch_id = teacher.branch_id.clone().or(session.branch_id);
            session.group_ids = groups.iter().map(|g| g.id.clone()).collect();
            session.group_names = groups.into_iter().map(|g| g.name).collect();
        }
        Role::Parent => {
            let children = index_by_id(Repo::<Child>::new(store).list()?);
            let groups = index_by_id(Repo::<Group>::new(store).list()?);
            for cid in &account.child_ids {
                let Some(child) = children.get(cid) else {
                    continue;
                };
                session.child_names.push(child.name.clone());
                if let Some(group) = child.group_id.as_ref().and_then(|g| groups.get(g)) {
                    if !session.group_ids.contains(&group.id) {
                        session.group_ids.push(group.id.clone());
                        session.group_names.push(group.name.clone());
                    }
                }
                if session.branch_id.is_none() {
                    session.branch_id = child.branch_id.clone();
                }
            }
        }
        _ => {}
    }
    Ok(session)
}

fn demo_session(username: &str, role: Role) -> SessionUser {
    let display_name = if username.is_empty() {
        role.as_str().to_string()
    } else {
        username.to_string()
    };
    SessionUser {
        id: format!("demo-{}", role.as_str()),
        username: username.to_string(),
        role,
        display_name,
        teacher_id: None,
        child_ids: Vec::new(),
        branch_id: None,
        group_ids: Vec::new(),
        group_names: Vec::new(),
        child_names: Vec::new(),
        demo: true,
        logged_in_at: now(),
    }
}

/// Resolves `(secret_code, username)` to a session and persists it.
///
/// Stored accounts are checked first; the demo code table is the fallback.
/// Both an unknown username and a wrong secret yield
/// [`AuthError::InvalidCredentials`].
pub fn login(
    store: &RecordStore,
    settings: &AuthSettings,
    secret_code: &str,
    username: &str,
) -> Result<SessionUser, AuthError> {
    let username = username.trim();
    let given = secret_code.trim();
    let secret = normalize_secret(given);
    if secret.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let accounts: Vec<Account> = store.load_or(KEY_ACCOUNTS, Vec::new());
    let matched = accounts.iter().find(|a| {
        !username.is_empty()
            && a.username == username
            && secrets_match(&a.secret, given, settings.secret_case_insensitive)
    });

    let session = match matched {
        Some(account) => session_from_account(store, account)?,
        None => {
            let demo = settings
                .demo_codes_enabled
                .then(|| DEMO_CODES.iter().find(|(code, _)| *code == secret))
                .flatten();
            let Some((_, role)) = demo else {
                info!("login rejected");
                return Err(AuthError::InvalidCredentials);
            };
            warn!(role = role.as_str(), "login through demo code");
            demo_session(username, *role)
        }
    };

    store.save(KEY_SESSION, &session)?;
    info!(user_id = %session.id, role = session.role.as_str(), "login succeeded");
    Ok(session)
}

pub fn logout(store: &RecordStore) -> Result<bool, StoreError> {
    let removed = store.remove(KEY_SESSION)?;
    if removed {
        info!("logged out");
    }
    Ok(removed)
}

/// The persisted session, if any. An unreadable session counts as none.
pub fn current_session(store: &RecordStore) -> Option<SessionUser> {
    store.load_or(KEY_SESSION, None)
}

pub fn session_state(store: Option<&RecordStore>) -> SessionState {
    match store {
        None => SessionState::Loading,
        Some(store) => match current_session(store) {
            Some(user) => SessionState::Authenticated(user.role),
            None => SessionState::Unauthenticated,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory;
    use crate::model::Teacher;

    fn account(username: &str, secret: &str, role: Role) -> Account {
        Account {
            id: String::new(),
            username: username.into(),
            secret: secret.into(),
            role,
            display_name: String::new(),
            teacher_id: None,
            child_ids: Vec::new(),
            branch_id: None,
            created_at: None,
        }
    }

    #[test]
    fn stored_account_logs_in_with_its_role() {
        let store = RecordStore::in_memory();
        for (u, s, r) in [
            ("dir", "d-123", Role::Director),
            ("adm", "a-1", Role::Admin),
            ("boss", "root", Role::Superadmin),
        ] {
            directory::create_account(&store, account(u, s, r)).expect("account");
        }
        let settings = AuthSettings::default();
        for (u, s, r) in [("dir", " d-123 ", Role::Director), ("adm", "A-1", Role::Admin), ("boss", "ROOT", Role::Superadmin)] {
            let session = login(&store, &settings, s, u).expect("login");
            assert_eq!(session.role, r);
            assert_eq!(current_session(&store).expect("session").role, r);
        }
    }

    #[test]
    fn unknown_user_and_wrong_secret_fail_the_same_way() {
        let store = RecordStore::in_memory();
        directory::create_account(&store, account("dir", "d-123", Role::Director)).expect("account");
        let settings = AuthSettings::default();

        let unknown = login(&store, &settings, "d-123", "nobody").expect_err("unknown user");
        let wrong = login(&store, &settings, "nope", "dir").expect_err("wrong secret");
        assert_eq!(unknown.to_string(), LOGIN_FAILED_MESSAGE);
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(current_session(&store).is_none());
    }

    #[test]
    fn demo_codes_only_work_when_enabled() {
        let store = RecordStore::in_memory();
        let off = AuthSettings::default();
        assert!(login(&store, &off, "admin-demo", "x").is_err());

        let on = AuthSettings {
            demo_codes_enabled: true,
            ..AuthSettings::default()
        };
        let session = login(&store, &on, " admin-demo ", "Malika").expect("demo login");
        assert_eq!(session.role, Role::Admin);
        assert!(session.demo);
        assert_eq!(session.display_name, "Malika");
    }

    #[test]
    fn teacher_session_is_enriched_from_teacher_record() {
        let store = RecordStore::in_memory();
        let g = directory::create_group(
            &store,
            Group {
                id: String::new(),
                name: "Kapalak".into(),
                branch_id: None,
                teacher_id: None,
                capacity: None,
            },
        )
        .expect("group");
        directory::create_teacher(
            &store,
            Teacher {
                id: String::new(),
                name: "Dilnoza".into(),
                phone: None,
                photo: None,
                branch_id: None,
                assigned_groups: vec![g.id.clone()],
                username: Some("dilnoza".into()),
                secret: Some("t-77".into()),
            },
        )
        .expect("teacher");

        let session = login(&store, &AuthSettings::default(), "T-77", "dilnoza").expect("login");
        assert_eq!(session.role, Role::Teacher);
        assert_eq!(session.display_name, "Dilnoza");
        assert_eq!(session.group_names, vec!["Kapalak".to_string()]);
    }

    #[test]
    fn logout_clears_session_state() {
        let store = RecordStore::in_memory();
        let on = AuthSettings {
            demo_codes_enabled: true,
            ..AuthSettings::default()
        };
        assert_eq!(session_state(None), SessionState::Loading);
        assert_eq!(session_state(Some(&store)), SessionState::Unauthenticated);
        login(&store, &on, "PARENT-DEMO", "ota").expect("login");
        assert_eq!(session_state(Some(&store)), SessionState::Authenticated(Role::Parent));
        assert!(logout(&store).expect("logout"));
        assert_eq!(session_state(Some(&store)), SessionState::Unauthenticated);
    }
}
