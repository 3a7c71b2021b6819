//! Operations on branches, groups, children, teachers and accounts that must
//! keep several collections consistent. Each public operation runs as one
//! atomic store unit.
//!
//! Kept invariants:
//! - a group id is in a teacher's `assignedGroups` exactly when the group's
//!   `teacherId` is that teacher;
//! - a child with parent credentials is linked from exactly one parent
//!   account, and parent accounts without children do not survive;
//! - a teacher has at most one account, and loses it with the teacher;
//! - usernames are unique across accounts (ASCII case-insensitive);
//! - stored foreign keys point at existing records.

use crate::auth::secrets_match;
use crate::model::{Account, Branch, Child, Group, Record, Role, StorageItem, Teacher};
use crate::repo::Repo;
use crate::store::{RecordStore, StoreError};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("username already in use: {0}")]
    UsernameTaken(String),
    #[error("{field} references a missing {kind}: {id}")]
    InvalidReference {
        field: &'static str,
        kind: &'static str,
        id: String,
    },
    #[error("branch {id} is still used by {used_by}")]
    BranchInUse { id: String, used_by: &'static str },
    #[error("{0}")]
    Invalid(String),
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn clean(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn require<T: Record>(
    store: &RecordStore,
    field: &'static str,
    kind: &'static str,
    id: Option<&str>,
) -> Result<(), DirectoryError> {
    let Some(id) = id else { return Ok(()) };
    if Repo::<T>::new(store).get(id)?.is_none() {
        return Err(DirectoryError::InvalidReference {
            field,
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn require_name(name: &str, kind: &str) -> Result<String, DirectoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DirectoryError::Invalid(format!("{} name must not be empty", kind)));
    }
    Ok(name.to_string())
}

fn ensure_username_free(
    accounts: &[Account],
    username: &str,
    except_account: Option<&str>,
) -> Result<(), DirectoryError> {
    let taken = accounts
        .iter()
        .filter(|a| Some(a.id.as_str()) != except_account)
        .any(|a| a.username.eq_ignore_ascii_case(username));
    if taken {
        return Err(DirectoryError::UsernameTaken(username.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Branches

pub fn create_branch(store: &RecordStore, mut branch: Branch) -> Result<Branch, DirectoryError> {
    branch.name = require_name(&branch.name, "branch")?;
    Ok(Repo::<Branch>::new(store).insert(branch)?)
}

pub fn update_branch(store: &RecordStore, mut branch: Branch) -> Result<Branch, DirectoryError> {
    branch.name = require_name(&branch.name, "branch")?;
    if !Repo::<Branch>::new(store).update(&branch)? {
        return Err(DirectoryError::NotFound {
            kind: "branch",
            id: branch.id,
        });
    }
    Ok(branch)
}

/// Names the first collection still pointing at `branch_id`.
fn branch_user(store: &RecordStore, branch_id: &str) -> Result<Option<&'static str>, DirectoryError> {
    let here = |b: &Option<String>| b.as_deref() == Some(branch_id);
    if Repo::<Group>::new(store).list()?.iter().any(|g| here(&g.branch_id)) {
        return Ok(Some("groups"));
    }
    if Repo::<Child>::new(store).list()?.iter().any(|c| here(&c.branch_id)) {
        return Ok(Some("children"));
    }
    if Repo::<Teacher>::new(store).list()?.iter().any(|t| here(&t.branch_id)) {
        return Ok(Some("teachers"));
    }
    if Repo::<Account>::new(store).list()?.iter().any(|a| here(&a.branch_id)) {
        return Ok(Some("accounts"));
    }
    if Repo::<StorageItem>::new(store).list()?.iter().any(|i| here(&i.branch_id)) {
        return Ok(Some("storage"));
    }
    Ok(None)
}

/// Refused while anything still belongs to the branch.
pub fn delete_branch(store: &RecordStore, branch_id: &str) -> Result<Branch, DirectoryError> {
    store.atomically(|s| {
        if let Some(used_by) = branch_user(s, branch_id)? {
            return Err(DirectoryError::BranchInUse {
                id: branch_id.to_string(),
                used_by,
            });
        }
        Repo::<Branch>::new(s)
            .remove(branch_id)?
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "branch",
                id: branch_id.to_string(),
            })
    })
}

// ---------------------------------------------------------------------------
// Groups

/// Points `group_id` at `teacher_id` (or at nobody) and rewrites every
/// teacher's `assignedGroups` to match.
fn set_group_teacher(
    store: &RecordStore,
    group_id: &str,
    teacher_id: Option<&str>,
) -> Result<(), DirectoryError> {
    let groups_repo = Repo::<Group>::new(store);
    let teachers_repo = Repo::<Teacher>::new(store);

    let mut groups = groups_repo.list()?;
    let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
        return Err(DirectoryError::NotFound {
            kind: "group",
            id: group_id.to_string(),
        });
    };
    let mut teachers = teachers_repo.list()?;
    if let Some(tid) = teacher_id {
        if !teachers.iter().any(|t| t.id == tid) {
            return Err(DirectoryError::InvalidReference {
                field: "teacherId",
                kind: "teacher",
                id: tid.to_string(),
            });
        }
    }
    group.teacher_id = teacher_id.map(str::to_string);

    for t in teachers.iter_mut() {
        let should_have = Some(t.id.as_str()) == teacher_id;
        let has = t.assigned_groups.iter().any(|g| g == group_id);
        if should_have && !has {
            t.assigned_groups.push(group_id.to_string());
        } else if !should_have && has {
            t.assigned_groups.retain(|g| g != group_id);
        }
    }

    groups_repo.replace_all(&groups)?;
    teachers_repo.replace_all(&teachers)?;
    Ok(())
}

pub fn assign_teacher(
    store: &RecordStore,
    group_id: &str,
    teacher_id: Option<&str>,
) -> Result<Group, DirectoryError> {
    store.atomically(|s| {
        set_group_teacher(s, group_id, teacher_id)?;
        Repo::<Group>::new(s)
            .get(group_id)?
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "group",
                id: group_id.to_string(),
            })
    })
}

pub fn create_group(store: &RecordStore, mut group: Group) -> Result<Group, DirectoryError> {
    group.name = require_name(&group.name, "group")?;
    store.atomically(|s| {
        require::<Branch>(s, "branchId", "branch", group.branch_id.as_deref())?;
        let teacher_id = group.teacher_id.take();
        let created = Repo::<Group>::new(s).insert(group)?;
        if teacher_id.is_some() {
            set_group_teacher(s, &created.id, teacher_id.as_deref())?;
        }
        Ok(Repo::<Group>::new(s).get(&created.id)?.unwrap_or(created))
    })
}

pub fn update_group(store: &RecordStore, mut group: Group) -> Result<Group, DirectoryError> {
    group.name = require_name(&group.name, "group")?;
    store.atomically(|s| {
        let repo = Repo::<Group>::new(s);
        let Some(prev) = repo.get(&group.id)? else {
            return Err(DirectoryError::NotFound {
                kind: "group",
                id: group.id.clone(),
            });
        };
        require::<Branch>(s, "branchId", "branch", group.branch_id.as_deref())?;
        let teacher_id = group.teacher_id.clone();
        group.teacher_id = prev.teacher_id.clone();
        repo.update(&group)?;
        if teacher_id != prev.teacher_id {
            set_group_teacher(s, &group.id, teacher_id.as_deref())?;
        }
        Ok(repo.get(&group.id)?.unwrap_or(group))
    })
}

/// Removes the group, clears `groupId` on its children and drops it from
/// every teacher's `assignedGroups`.
pub fn delete_group(store: &RecordStore, group_id: &str) -> Result<Group, DirectoryError> {
    store.atomically(|s| {
        let removed = Repo::<Group>::new(s)
            .remove(group_id)?
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "group",
                id: group_id.to_string(),
            })?;

        let children_repo = Repo::<Child>::new(s);
        let mut children = children_repo.list()?;
        let mut touched = false;
        for c in children.iter_mut().filter(|c| c.group_id.as_deref() == Some(group_id)) {
            c.group_id = None;
            touched = true;
        }
        if touched {
            children_repo.replace_all(&children)?;
        }

        let teachers_repo = Repo::<Teacher>::new(s);
        let mut teachers = teachers_repo.list()?;
        let before: usize = teachers.iter().map(|t| t.assigned_groups.len()).sum();
        for t in teachers.iter_mut() {
            t.assigned_groups.retain(|g| g != group_id);
        }
        let after: usize = teachers.iter().map(|t| t.assigned_groups.len()).sum();
        if before != after {
            teachers_repo.replace_all(&teachers)?;
        }
        Ok(removed)
    })
}

// ---------------------------------------------------------------------------
// Children and parent accounts

/// `previous` is the stored child on update. A child moved to another group
/// follows that group's branch.
fn validate_child(
    store: &RecordStore,
    child: &mut Child,
    previous: Option<&Child>,
) -> Result<(), DirectoryError> {
    child.name = require_name(&child.name, "child")?;
    child.login = clean(&child.login);
    child.password = clean(&child.password);
    require::<Branch>(store, "branchId", "branch", child.branch_id.as_deref())?;
    if let Some(gid) = child.group_id.as_deref() {
        let Some(group) = Repo::<Group>::new(store).get(gid)? else {
            return Err(DirectoryError::InvalidReference {
                field: "groupId",
                kind: "group",
                id: gid.to_string(),
            });
        };
        // On creation an explicit branch wins over the group's.
        let moved = previous.is_some_and(|p| p.group_id != child.group_id);
        if child.branch_id.is_none() || (moved && group.branch_id.is_some()) {
            child.branch_id = group.branch_id;
        }
    }
    Ok(())
}

/// Links `child` to the parent account named `username`, creating it when
/// absent. An existing account only accepts the child when it is a parent
/// account with the same secret.
fn link_parent_account(
    store: &RecordStore,
    username: &str,
    secret: &str,
    child: &Child,
) -> Result<Account, DirectoryError> {
    let repo = Repo::<Account>::new(store);
    let mut accounts = repo.list()?;
    if let Some(existing) = accounts
        .iter_mut()
        .find(|a| a.username.eq_ignore_ascii_case(username))
    {
        if existing.role != Role::Parent || !secrets_match(&existing.secret, secret, true) {
            return Err(DirectoryError::UsernameTaken(username.to_string()));
        }
        if !existing.child_ids.contains(&child.id) {
            existing.child_ids.push(child.id.clone());
        }
        let linked = existing.clone();
        repo.replace_all(&accounts)?;
        return Ok(linked);
    }

    let account = Account {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        secret: secret.to_string(),
        role: Role::Parent,
        display_name: child
            .parent_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| username.to_string()),
        teacher_id: None,
        child_ids: vec![child.id.clone()],
        branch_id: child.branch_id.clone(),
        created_at: Some(now()),
    };
    accounts.push(account.clone());
    repo.replace_all(&accounts)?;
    info!(child_id = %child.id, account_id = %account.id, "parent account created");
    Ok(account)
}

/// Moves parent accounts of `child` whose branch came from the child's old
/// branch along with it.
fn follow_child_branch(
    store: &RecordStore,
    child: &Child,
    old_branch: Option<&str>,
) -> Result<(), DirectoryError> {
    let repo = Repo::<Account>::new(store);
    let mut accounts = repo.list()?;
    let mut touched = false;
    for a in accounts.iter_mut().filter(|a| {
        a.role == Role::Parent
            && a.child_ids.contains(&child.id)
            && a.branch_id.as_deref() == old_branch
    }) {
        a.branch_id = child.branch_id.clone();
        touched = true;
    }
    if touched {
        repo.replace_all(&accounts)?;
    }
    Ok(())
}

/// Drops `child_id` from every parent account and deletes accounts left with
/// no children. Returns the number of accounts deleted.
fn unlink_child(store: &RecordStore, child_id: &str) -> Result<usize, DirectoryError> {
    let repo = Repo::<Account>::new(store);
    let accounts = repo.list()?;
    let before = accounts.len();
    let mut changed = false;
    let kept: Vec<Account> = accounts
        .into_iter()
        .filter_map(|mut a| {
            if a.role != Role::Parent || !a.child_ids.iter().any(|c| c == child_id) {
                return Some(a);
            }
            changed = true;
            a.child_ids.retain(|c| c != child_id);
            (!a.child_ids.is_empty()).then_some(a)
        })
        .collect();
    if changed {
        repo.replace_all(&kept)?;
    }
    Ok(before - kept.len())
}

pub fn create_child(store: &RecordStore, mut child: Child) -> Result<Child, DirectoryError> {
    store.atomically(|s| {
        validate_child(s, &mut child, None)?;
        let created = Repo::<Child>::new(s).insert(child)?;
        if let (Some(login), Some(password)) = (created.login.as_deref(), created.password.as_deref()) {
            link_parent_account(s, login, password, &created)?;
        }
        Ok(created)
    })
}

pub fn update_child(store: &RecordStore, mut child: Child) -> Result<Child, DirectoryError> {
    store.atomically(|s| {
        let repo = Repo::<Child>::new(s);
        let Some(prev) = repo.get(&child.id)? else {
            return Err(DirectoryError::NotFound {
                kind: "child",
                id: child.id.clone(),
            });
        };
        validate_child(s, &mut child, Some(&prev))?;
        repo.update(&child)?;

        if child.branch_id != prev.branch_id {
            follow_child_branch(s, &child, prev.branch_id.as_deref())?;
        }

        let creds_changed = prev.login != child.login || prev.password != child.password;
        if !creds_changed {
            return Ok(child);
        }
        let (Some(login), Some(password)) = (child.login.clone(), child.password.clone()) else {
            // Cleared credentials: the child no longer has a parent login.
            let dropped = unlink_child(s, &child.id)?;
            info!(child_id = %child.id, parent_accounts_removed = dropped, "parent login cleared");
            return Ok(child);
        };
        let accounts_repo = Repo::<Account>::new(s);
        let mut accounts = accounts_repo.list()?;
        let sole_owner = accounts.iter().position(|a| {
            a.role == Role::Parent && a.child_ids.len() == 1 && a.child_ids[0] == child.id
        });
        match sole_owner {
            // The account exists only for this child, so it follows the child's credentials.
            Some(pos) => {
                let account_id = accounts[pos].id.clone();
                ensure_username_free(&accounts, &login, Some(&account_id))?;
                accounts[pos].username = login;
                accounts[pos].secret = password;
                accounts_repo.replace_all(&accounts)?;
            }
            None => {
                unlink_child(s, &child.id)?;
                link_parent_account(s, &login, &password, &child)?;
            }
        }
        Ok(child)
    })
}

pub fn delete_child(store: &RecordStore, child_id: &str) -> Result<Child, DirectoryError> {
    store.atomically(|s| {
        let removed = Repo::<Child>::new(s)
            .remove(child_id)?
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "child",
                id: child_id.to_string(),
            })?;
        let dropped = unlink_child(s, child_id)?;
        info!(child_id, parent_accounts_removed = dropped, "child deleted");
        Ok(removed)
    })
}

// ---------------------------------------------------------------------------
// Teachers and teacher accounts

fn validate_teacher(store: &RecordStore, teacher: &mut Teacher) -> Result<(), DirectoryError> {
    teacher.name = require_name(&teacher.name, "teacher")?;
    teacher.username = clean(&teacher.username);
    teacher.secret = clean(&teacher.secret);
    require::<Branch>(store, "branchId", "branch", teacher.branch_id.as_deref())?;
    let groups = Repo::<Group>::new(store).index()?;
    let mut seen = HashSet::new();
    teacher.assigned_groups.retain(|g| seen.insert(g.clone()));
    for gid in &teacher.assigned_groups {
        if !groups.contains_key(gid) {
            return Err(DirectoryError::InvalidReference {
                field: "assignedGroups",
                kind: "group",
                id: gid.clone(),
            });
        }
    }
    Ok(())
}

/// Creates, updates or removes the single account tied to `teacher`.
fn sync_teacher_account(store: &RecordStore, teacher: &Teacher) -> Result<(), DirectoryError> {
    let repo = Repo::<Account>::new(store);
    let mut accounts = repo.list()?;
    let pos = accounts
        .iter()
        .position(|a| a.teacher_id.as_deref() == Some(teacher.id.as_str()));

    match (pos, teacher.username.as_deref(), teacher.secret.as_deref()) {
        (Some(pos), Some(username), Some(secret)) => {
            let account_id = accounts[pos].id.clone();
            ensure_username_free(&accounts, username, Some(&account_id))?;
            let a = &mut accounts[pos];
            a.username = username.to_string();
            a.secret = secret.to_string();
            a.display_name = teacher.name.clone();
            a.branch_id = teacher.branch_id.clone();
        }
        (None, Some(username), Some(secret)) => {
            ensure_username_free(&accounts, username, None)?;
            accounts.push(Account {
                id: uuid::Uuid::new_v4().to_string(),
                username: username.to_string(),
                secret: secret.to_string(),
                role: Role::Teacher,
                display_name: teacher.name.clone(),
                teacher_id: Some(teacher.id.clone()),
                child_ids: Vec::new(),
                branch_id: teacher.branch_id.clone(),
                created_at: Some(now()),
            });
        }
        (Some(pos), _, _) => {
            accounts.remove(pos);
        }
        (None, _, _) => return Ok(()),
    }
    repo.replace_all(&accounts)?;
    Ok(())
}

fn sync_teacher_groups(
    store: &RecordStore,
    teacher_id: &str,
    previous: &[String],
    wanted: &[String],
) -> Result<(), DirectoryError> {
    for gid in previous.iter().filter(|g| !wanted.contains(g)) {
        set_group_teacher(store, gid, None)?;
    }
    for gid in wanted {
        set_group_teacher(store, gid, Some(teacher_id))?;
    }
    Ok(())
}

pub fn create_teacher(store: &RecordStore, mut teacher: Teacher) -> Result<Teacher, DirectoryError> {
    store.atomically(|s| {
        validate_teacher(s, &mut teacher)?;
        let wanted = std::mem::take(&mut teacher.assigned_groups);
        let created = Repo::<Teacher>::new(s).insert(teacher)?;
        sync_teacher_groups(s, &created.id, &[], &wanted)?;
        sync_teacher_account(s, &created)?;
        Ok(Repo::<Teacher>::new(s).get(&created.id)?.unwrap_or(created))
    })
}

pub fn update_teacher(store: &RecordStore, mut teacher: Teacher) -> Result<Teacher, DirectoryError> {
    store.atomically(|s| {
        let repo = Repo::<Teacher>::new(s);
        let Some(prev) = repo.get(&teacher.id)? else {
            return Err(DirectoryError::NotFound {
                kind: "teacher",
                id: teacher.id.clone(),
            });
        };
        validate_teacher(s, &mut teacher)?;
        let wanted = std::mem::replace(&mut teacher.assigned_groups, prev.assigned_groups.clone());
        repo.update(&teacher)?;
        sync_teacher_groups(s, &teacher.id, &prev.assigned_groups, &wanted)?;
        sync_teacher_account(s, &teacher)?;
        Ok(repo.get(&teacher.id)?.unwrap_or(teacher))
    })
}

/// Removes the teacher, exactly the accounts whose `teacherId` matches, and
/// the teacher from any group that pointed at them.
pub fn delete_teacher(store: &RecordStore, teacher_id: &str) -> Result<Teacher, DirectoryError> {
    store.atomically(|s| {
        let removed = Repo::<Teacher>::new(s)
            .remove(teacher_id)?
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "teacher",
                id: teacher_id.to_string(),
            })?;

        let dropped = Repo::<Account>::new(s)
            .remove_where(|a| a.teacher_id.as_deref() == Some(teacher_id))?;

        let groups_repo = Repo::<Group>::new(s);
        let mut groups = groups_repo.list()?;
        let mut touched = false;
        for g in groups
            .iter_mut()
            .filter(|g| g.teacher_id.as_deref() == Some(teacher_id))
        {
            g.teacher_id = None;
            touched = true;
        }
        if touched {
            groups_repo.replace_all(&groups)?;
        }
        info!(teacher_id, accounts_removed = dropped.len(), "teacher deleted");
        Ok(removed)
    })
}

/// Groups a teacher leads, from either side of the relationship.
pub fn teacher_groups(groups: &[Group], teacher: &Teacher) -> Vec<Group> {
    groups
        .iter()
        .filter(|g| {
            g.teacher_id.as_deref() == Some(teacher.id.as_str())
                || teacher.assigned_groups.contains(&g.id)
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Accounts managed directly

/// A teacher has at most one account.
fn ensure_teacher_unclaimed(
    accounts: &[Account],
    account: &Account,
    except_account: Option<&str>,
) -> Result<(), DirectoryError> {
    let Some(tid) = account.teacher_id.as_deref() else {
        return Ok(());
    };
    let claimed = accounts
        .iter()
        .filter(|a| Some(a.id.as_str()) != except_account)
        .any(|a| a.teacher_id.as_deref() == Some(tid));
    if claimed {
        return Err(DirectoryError::Invalid(format!(
            "teacher {} already has an account",
            tid
        )));
    }
    Ok(())
}

fn validate_account(store: &RecordStore, account: &mut Account) -> Result<(), DirectoryError> {
    account.username = account.username.trim().to_string();
    account.secret = account.secret.trim().to_string();
    if account.username.is_empty() || account.secret.is_empty() {
        return Err(DirectoryError::Invalid(
            "username and secret must not be empty".to_string(),
        ));
    }
    if account.display_name.trim().is_empty() {
        account.display_name = account.username.clone();
    }
    require::<Teacher>(store, "teacherId", "teacher", account.teacher_id.as_deref())?;
    require::<Branch>(store, "branchId", "branch", account.branch_id.as_deref())?;
    let children = Repo::<Child>::new(store).index()?;
    for cid in &account.child_ids {
        if !children.contains_key(cid) {
            return Err(DirectoryError::InvalidReference {
                field: "childIds",
                kind: "child",
                id: cid.clone(),
            });
        }
    }
    Ok(())
}

pub fn create_account(store: &RecordStore, mut account: Account) -> Result<Account, DirectoryError> {
    store.atomically(|s| {
        validate_account(s, &mut account)?;
        let repo = Repo::<Account>::new(s);
        let accounts = repo.list()?;
        ensure_username_free(&accounts, &account.username, None)?;
        ensure_teacher_unclaimed(&accounts, &account, None)?;
        if account.created_at.is_none() {
            account.created_at = Some(now());
        }
        Ok(repo.insert(account)?)
    })
}

pub fn update_account(store: &RecordStore, mut account: Account) -> Result<Account, DirectoryError> {
    store.atomically(|s| {
        validate_account(s, &mut account)?;
        let repo = Repo::<Account>::new(s);
        let accounts = repo.list()?;
        let Some(prev) = accounts.iter().find(|a| a.id == account.id) else {
            return Err(DirectoryError::NotFound {
                kind: "account",
                id: account.id.clone(),
            });
        };
        ensure_username_free(&accounts, &account.username, Some(&account.id))?;
        ensure_teacher_unclaimed(&accounts, &account, Some(&account.id))?;
        account.created_at = prev.created_at.clone();
        repo.update(&account)?;
        Ok(account)
    })
}

pub fn delete_account(store: &RecordStore, account_id: &str) -> Result<Account, DirectoryError> {
    Repo::<Account>::new(store)
        .remove(account_id)?
        .ok_or_else(|| DirectoryError::NotFound {
            kind: "account",
            id: account_id.to_string(),
        })
}

/// Adds a child to an existing parent account (a second child, or a second
/// guardian for the same child).
pub fn link_child(
    store: &RecordStore,
    account_id: &str,
    child_id: &str,
) -> Result<Account, DirectoryError> {
    store.atomically(|s| {
        require::<Child>(s, "childId", "child", Some(child_id))?;
        let repo = Repo::<Account>::new(s);
        let Some(mut account) = repo.get(account_id)? else {
            return Err(DirectoryError::NotFound {
                kind: "account",
                id: account_id.to_string(),
            });
        };
        if account.role != Role::Parent {
            return Err(DirectoryError::Invalid(
                "only parent accounts can be linked to children".to_string(),
            ));
        }
        if !account.child_ids.iter().any(|c| c == child_id) {
            account.child_ids.push(child_id.to_string());
            repo.update(&account)?;
        }
        Ok(account)
    })
}
