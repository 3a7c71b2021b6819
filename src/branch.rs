//! Branch-scoped views over the stored collections.
//!
//! Groups, children, teachers and storage items carry a `branchId` directly.
//! Everything else reaches a branch through a group or a child:
//!
//! - activities: the activity's group, else the group of its child
//! - meals, homework, attendance: their group
//! - parent accounts: any linked child
//! - complaints, vaccinations, sleep records: their child

use crate::model::{
    Account, Activity, AttendanceDay, Child, Complaint, Group, Homework, Meal, Role, SleepRecord,
    StorageItem, Teacher, Vaccination,
};
use std::collections::HashMap;

pub const ALL_BRANCHES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BranchScope {
    #[default]
    All,
    Branch(String),
}

impl BranchScope {
    /// `None`, an empty string and `"all"` all mean every branch.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::All,
            Some(s) if s.eq_ignore_ascii_case(ALL_BRANCHES) => Self::All,
            Some(s) => Self::Branch(s.to_string()),
        }
    }

    pub fn as_param(&self) -> &str {
        match self {
            Self::All => ALL_BRANCHES,
            Self::Branch(id) => id,
        }
    }

    fn admits(&self, branch_id: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Branch(id) => branch_id == Some(id.as_str()),
        }
    }
}

/// Id lookups for the chain a record walks to reach its branch. Built once
/// per evaluation from the collections that were just loaded.
pub struct BranchView<'a> {
    scope: &'a BranchScope,
    groups: HashMap<&'a str, &'a Group>,
    children: HashMap<&'a str, &'a Child>,
}

impl<'a> BranchView<'a> {
    pub fn new(scope: &'a BranchScope, groups: &'a [Group], children: &'a [Child]) -> Self {
        Self {
            scope,
            groups: groups.iter().map(|g| (g.id.as_str(), g)).collect(),
            children: children.iter().map(|c| (c.id.as_str(), c)).collect(),
        }
    }

    fn group_in_scope(&self, group_id: Option<&str>) -> bool {
        match self.scope {
            BranchScope::All => true,
            BranchScope::Branch(_) => group_id
                .and_then(|id| self.groups.get(id))
                .is_some_and(|g| self.scope.admits(g.branch_id.as_deref())),
        }
    }

    fn child_in_scope(&self, child_id: Option<&str>) -> bool {
        match self.scope {
            BranchScope::All => true,
            BranchScope::Branch(_) => child_id
                .and_then(|id| self.children.get(id))
                .is_some_and(|c| self.scope.admits(c.branch_id.as_deref())),
        }
    }

    pub fn groups<'r>(&self, groups: &'r [Group]) -> Vec<&'r Group> {
        groups
            .iter()
            .filter(|g| self.scope.admits(g.branch_id.as_deref()))
            .collect()
    }

    pub fn children<'r>(&self, children: &'r [Child]) -> Vec<&'r Child> {
        children
            .iter()
            .filter(|c| self.scope.admits(c.branch_id.as_deref()))
            .collect()
    }

    pub fn teachers<'r>(&self, teachers: &'r [Teacher]) -> Vec<&'r Teacher> {
        teachers
            .iter()
            .filter(|t| self.scope.admits(t.branch_id.as_deref()))
            .collect()
    }

    pub fn storage<'r>(&self, items: &'r [StorageItem]) -> Vec<&'r StorageItem> {
        items
            .iter()
            .filter(|s| self.scope.admits(s.branch_id.as_deref()))
            .collect()
    }

    pub fn activities<'r>(&self, activities: &'r [Activity]) -> Vec<&'r Activity> {
        activities
            .iter()
            .filter(|a| {
                let group_id = a.group_id.as_deref().or_else(|| {
                    a.child_id
                        .as_deref()
                        .and_then(|cid| self.children.get(cid))
                        .and_then(|c| c.group_id.as_deref())
                });
                self.group_in_scope(group_id)
            })
            .collect()
    }

    pub fn meals<'r>(&self, meals: &'r [Meal]) -> Vec<&'r Meal> {
        meals
            .iter()
            .filter(|m| match m.group_id.as_deref() {
                Some(gid) => self.group_in_scope(Some(gid)),
                None => self.child_in_scope(m.child_id.as_deref()),
            })
            .collect()
    }

    pub fn homework<'r>(&self, homework: &'r [Homework]) -> Vec<&'r Homework> {
        homework
            .iter()
            .filter(|h| self.group_in_scope(h.group_id.as_deref()))
            .collect()
    }

    pub fn attendance<'r>(&self, days: &'r [AttendanceDay]) -> Vec<&'r AttendanceDay> {
        days.iter()
            .filter(|d| self.group_in_scope(d.group_id.as_deref()))
            .collect()
    }

    pub fn parents<'r>(&self, accounts: &'r [Account]) -> Vec<&'r Account> {
        accounts
            .iter()
            .filter(|a| a.role == Role::Parent)
            .filter(|a| a.child_ids.iter().any(|cid| self.child_in_scope(Some(cid))))
            .collect()
    }

    pub fn complaints<'r>(&self, complaints: &'r [Complaint]) -> Vec<&'r Complaint> {
        complaints
            .iter()
            .filter(|c| self.child_in_scope(c.child_id.as_deref()))
            .collect()
    }

    pub fn vaccinations<'r>(&self, records: &'r [Vaccination]) -> Vec<&'r Vaccination> {
        records
            .iter()
            .filter(|v| self.child_in_scope(Some(&v.child_id)))
            .collect()
    }

    pub fn sleep<'r>(&self, records: &'r [SleepRecord]) -> Vec<&'r SleepRecord> {
        records
            .iter()
            .filter(|s| self.child_in_scope(Some(&s.child_id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, branch: Option<&str>) -> Group {
        Group {
            id: id.into(),
            name: format!("group {id}"),
            branch_id: branch.map(Into::into),
            teacher_id: None,
            capacity: None,
        }
    }

    fn child(id: &str, group: Option<&str>, branch: Option<&str>) -> Child {
        Child {
            id: id.into(),
            name: format!("child {id}"),
            age: Some(4),
            birth_date: None,
            group_id: group.map(Into::into),
            branch_id: branch.map(Into::into),
            gender: None,
            qr_code: None,
            parent_name: None,
            parent_phone: None,
            login: None,
            password: None,
        }
    }

    fn activity(id: &str, group: Option<&str>, child: Option<&str>) -> Activity {
        Activity {
            id: id.into(),
            title: "Rasm".into(),
            date: "2024-03-01".into(),
            group_id: group.map(Into::into),
            child_id: child.map(Into::into),
            description: None,
        }
    }

    fn parent(id: &str, children: &[&str]) -> Account {
        Account {
            id: id.into(),
            username: id.into(),
            secret: "X".into(),
            role: Role::Parent,
            display_name: id.into(),
            teacher_id: None,
            child_ids: children.iter().map(|c| c.to_string()).collect(),
            branch_id: None,
            created_at: None,
        }
    }

    #[test]
    fn scope_parses_sentinel_and_ids() {
        assert_eq!(BranchScope::parse(None), BranchScope::All);
        assert_eq!(BranchScope::parse(Some("ALL")), BranchScope::All);
        assert_eq!(BranchScope::parse(Some(" ")), BranchScope::All);
        assert_eq!(BranchScope::parse(Some("b1")), BranchScope::Branch("b1".into()));
        assert_eq!(BranchScope::Branch("b1".into()).as_param(), "b1");
    }

    #[test]
    fn all_scope_returns_every_record_of_every_kind() {
        let groups = vec![group("g1", Some("b1")), group("g2", None)];
        let children = vec![child("c1", Some("g1"), Some("b1")), child("c2", None, None)];
        let activities = vec![activity("a1", Some("g1"), None), activity("a2", None, None)];
        let accounts = vec![parent("p1", &["c1"]), parent("p2", &[])];
        let complaints = vec![Complaint {
            id: "k1".into(),
            date: "2024-01-01".into(),
            subject: "x".into(),
            message: String::new(),
            child_id: None,
            author_id: None,
            status: Default::default(),
        }];

        let scope = BranchScope::All;
        let view = BranchView::new(&scope, &groups, &children);
        assert_eq!(view.groups(&groups).len(), groups.len());
        assert_eq!(view.children(&children).len(), children.len());
        assert_eq!(view.activities(&activities).len(), activities.len());
        assert_eq!(view.parents(&accounts).len(), accounts.len());
        assert_eq!(view.complaints(&complaints).len(), complaints.len());
    }

    #[test]
    fn activity_follows_child_group_not_child_branch() {
        // c1 claims branch b1 but sits in a group of branch b2.
        let groups = vec![group("g1", Some("b1")), group("g2", Some("b2"))];
        let children = vec![
            child("c1", Some("g2"), Some("b1")),
            child("c2", Some("g1"), Some("b1")),
        ];
        let activities = vec![activity("a1", None, Some("c1")), activity("a2", None, Some("c2"))];

        let scope = BranchScope::Branch("b1".into());
        let view = BranchView::new(&scope, &groups, &children);
        let ids: Vec<&str> = view.activities(&activities).iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2"]);
    }

    #[test]
    fn direct_and_child_chained_filters() {
        let groups = vec![group("g1", Some("b1")), group("g2", Some("b2"))];
        let children = vec![
            child("c1", Some("g1"), Some("b1")),
            child("c2", Some("g2"), Some("b2")),
        ];
        let accounts = vec![parent("p1", &["c2", "c1"]), parent("p2", &["c2"])];

        let scope = BranchScope::Branch("b1".into());
        let view = BranchView::new(&scope, &groups, &children);
        assert_eq!(view.groups(&groups).len(), 1);
        assert_eq!(view.children(&children)[0].id, "c1");
        let parents: Vec<&str> = view.parents(&accounts).iter().map(|a| a.id.as_str()).collect();
        assert_eq!(parents, vec!["p1"]);
    }
}
