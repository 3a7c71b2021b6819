use crate::model::Role;
use serde::Serialize;

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session has not been read yet.
    Loading,
    Authenticated(Role),
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum Decision {
    Allow,
    Wait,
    Redirect { to: String },
    NotFound,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteRule {
    pub prefix: &'static str,
    pub roles: &'static [Role],
}

pub const ROUTES: &[RouteRule] = &[
    RouteRule {
        prefix: "/superadmin",
        roles: &[Role::Superadmin],
    },
    RouteRule {
        prefix: "/admin",
        roles: &[Role::Admin, Role::Superadmin],
    },
    RouteRule {
        prefix: "/director",
        roles: &[Role::Director, Role::Superadmin],
    },
    RouteRule {
        prefix: "/teacher",
        roles: &[Role::Teacher],
    },
    RouteRule {
        prefix: "/parent",
        roles: &[Role::Parent],
    },
];

pub fn home_for(role: Role) -> String {
    format!("/{}/dashboard", role.as_str())
}

fn home_of(state: SessionState) -> Option<String> {
    match state {
        SessionState::Authenticated(role) => Some(home_for(role)),
        _ => None,
    }
}

/// Segment-aware prefix match: `/admin` matches `/admin` and `/admin/x`, not
/// `/administrator`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

pub fn rule_for(path: &str) -> Option<&'static RouteRule> {
    let path = normalize(path);
    ROUTES.iter().find(|r| matches_prefix(path, r.prefix))
}

/// Decides one navigation. The requested path is not remembered across a
/// redirect.
pub fn check(state: SessionState, path: &str) -> Decision {
    if state == SessionState::Loading {
        return Decision::Wait;
    }
    let path = normalize(path);

    if path == "/" {
        return Decision::Redirect {
            to: home_of(state).unwrap_or_else(|| LOGIN_PATH.to_string()),
        };
    }
    if path == LOGIN_PATH {
        return match home_of(state) {
            Some(to) => Decision::Redirect { to },
            None => Decision::Allow,
        };
    }

    let Some(rule) = rule_for(path) else {
        return Decision::NotFound;
    };
    match state {
        SessionState::Authenticated(role) if rule.roles.contains(&role) => Decision::Allow,
        SessionState::Authenticated(role) => Decision::Redirect { to: home_for(role) },
        _ => Decision::Redirect {
            to: LOGIN_PATH.to_string(),
        },
    }
}
