//! Generic CRUD over the date-stamped event collections and storage stock.
//!
//! Writes accept `expectedVersion`: the collection version the caller last
//! listed. A write against a collection that moved since then fails with
//! `version_conflict` instead of overwriting another tab's change.

use crate::branch::BranchView;
use crate::directory::DirectoryError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{branch_scope, opt_u64_param, record_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    Activity, AttendanceDay, Branch, Child, Complaint, Group, Homework, Meal, Record,
    SleepRecord, StorageItem, Vaccination,
};
use crate::repo::Repo;
use crate::store::{RecordStore, StoreError};
use serde_json::{json, Value};

/// A foreign key carried by a record: the field it sits in and the id.
enum Link<'a> {
    Branch(&'static str, &'a str),
    Group(&'static str, &'a str),
    Child(&'static str, &'a str),
}

/// Foreign keys a record carries; each must point at an existing record.
trait Linked {
    fn links(&self) -> Vec<Link<'_>>;
}

fn group_link<'a>(id: &'a Option<String>) -> Option<Link<'a>> {
    id.as_deref().map(|id| Link::Group("groupId", id))
}

fn child_link<'a>(id: &'a Option<String>) -> Option<Link<'a>> {
    id.as_deref().map(|id| Link::Child("childId", id))
}

impl Linked for Meal {
    fn links(&self) -> Vec<Link<'_>> {
        group_link(&self.group_id)
            .into_iter()
            .chain(child_link(&self.child_id))
            .collect()
    }
}

impl Linked for Vaccination {
    fn links(&self) -> Vec<Link<'_>> {
        vec![Link::Child("childId", &self.child_id)]
    }
}

impl Linked for Activity {
    fn links(&self) -> Vec<Link<'_>> {
        group_link(&self.group_id)
            .into_iter()
            .chain(child_link(&self.child_id))
            .collect()
    }
}

impl Linked for Complaint {
    fn links(&self) -> Vec<Link<'_>> {
        child_link(&self.child_id).into_iter().collect()
    }
}

impl Linked for AttendanceDay {
    fn links(&self) -> Vec<Link<'_>> {
        group_link(&self.group_id)
            .into_iter()
            .chain(self.present.iter().map(|id| Link::Child("present", id)))
            .chain(self.absent.iter().map(|id| Link::Child("absent", id)))
            .collect()
    }
}

impl Linked for Homework {
    fn links(&self) -> Vec<Link<'_>> {
        group_link(&self.group_id).into_iter().collect()
    }
}

impl Linked for SleepRecord {
    fn links(&self) -> Vec<Link<'_>> {
        vec![Link::Child("childId", &self.child_id)]
    }
}

impl Linked for StorageItem {
    fn links(&self) -> Vec<Link<'_>> {
        self.branch_id
            .as_deref()
            .map(|id| Link::Branch("branchId", id))
            .into_iter()
            .collect()
    }
}

fn check_links<T: Linked>(store: &RecordStore, record: &T) -> Result<(), HandlerErr> {
    let links = record.links();
    if links.is_empty() {
        return Ok(());
    }
    let branches = Repo::<Branch>::new(store).index()?;
    let groups = Repo::<Group>::new(store).index()?;
    let children = Repo::<Child>::new(store).index()?;
    for link in links {
        let (field, kind, id, known) = match link {
            Link::Branch(field, id) => (field, "branch", id, branches.contains_key(id)),
            Link::Group(field, id) => (field, "group", id, groups.contains_key(id)),
            Link::Child(field, id) => (field, "child", id, children.contains_key(id)),
        };
        if !known {
            return Err(DirectoryError::InvalidReference {
                field,
                kind,
                id: id.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// How a record type reaches its branch.
trait Scoped: Record + Linked {
    fn in_scope<'r>(view: &BranchView<'_>, records: &'r [Self]) -> Vec<&'r Self>;

    fn date(&self) -> Option<&str> {
        None
    }
}

macro_rules! scoped {
    ($ty:ty, $method:ident, dated) => {
        impl Scoped for $ty {
            fn in_scope<'r>(view: &BranchView<'_>, records: &'r [Self]) -> Vec<&'r Self> {
                view.$method(records)
            }

            fn date(&self) -> Option<&str> {
                Some(&self.date)
            }
        }
    };
    ($ty:ty, $method:ident) => {
        impl Scoped for $ty {
            fn in_scope<'r>(view: &BranchView<'_>, records: &'r [Self]) -> Vec<&'r Self> {
                view.$method(records)
            }
        }
    };
}

scoped!(Meal, meals, dated);
scoped!(Vaccination, vaccinations, dated);
scoped!(Activity, activities, dated);
scoped!(Complaint, complaints, dated);
scoped!(AttendanceDay, attendance, dated);
scoped!(Homework, homework, dated);
scoped!(SleepRecord, sleep, dated);
scoped!(StorageItem, storage);

#[derive(Clone, Copy)]
enum Collection {
    Meals,
    Vaccines,
    Activities,
    Complaints,
    Attendance,
    Homework,
    Sleep,
    Storage,
}

impl Collection {
    const ALL: [Self; 8] = [
        Self::Meals,
        Self::Vaccines,
        Self::Activities,
        Self::Complaints,
        Self::Attendance,
        Self::Homework,
        Self::Sleep,
        Self::Storage,
    ];

    fn key(self) -> &'static str {
        match self {
            Self::Meals => Meal::KEY,
            Self::Vaccines => Vaccination::KEY,
            Self::Activities => Activity::KEY,
            Self::Complaints => Complaint::KEY,
            Self::Attendance => AttendanceDay::KEY,
            Self::Homework => Homework::KEY,
            Self::Sleep => SleepRecord::KEY,
            Self::Storage => StorageItem::KEY,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == s)
    }
}

macro_rules! with_collection {
    ($c:expr, $f:ident($($arg:expr),*)) => {
        match $c {
            Collection::Meals => $f::<Meal>($($arg),*),
            Collection::Vaccines => $f::<Vaccination>($($arg),*),
            Collection::Activities => $f::<Activity>($($arg),*),
            Collection::Complaints => $f::<Complaint>($($arg),*),
            Collection::Attendance => $f::<AttendanceDay>($($arg),*),
            Collection::Homework => $f::<Homework>($($arg),*),
            Collection::Sleep => $f::<SleepRecord>($($arg),*),
            Collection::Storage => $f::<StorageItem>($($arg),*),
        }
    };
}

fn collection_param(req: &Request) -> Result<Collection, HandlerErr> {
    let name = str_param(req, "collection")?;
    Collection::parse(name).ok_or_else(|| {
        let known: Vec<&str> = Collection::ALL.iter().map(|c| c.key()).collect();
        HandlerErr::new("bad_params", format!("unknown collection: {}", name))
            .with_details(json!({ "known": known }))
    })
}

fn not_found(key: &str, id: &str) -> HandlerErr {
    HandlerErr::new("not_found", format!("{} record not found: {}", key, id))
        .with_details(json!({ "collection": key, "id": id }))
}

fn list<T: Scoped>(store: &RecordStore, req: &Request) -> Result<Value, HandlerErr> {
    let scope = branch_scope(store, req);
    let groups = Repo::<Group>::new(store).list()?;
    let children = Repo::<Child>::new(store).list()?;
    let (records, version) = Repo::<T>::new(store).list_versioned()?;
    let view = BranchView::new(&scope, &groups, &children);
    let mut visible = T::in_scope(&view, &records);
    if let Some(date) = req.params.get("date").and_then(Value::as_str) {
        visible.retain(|r| r.date().map_or(true, |d| d == date));
    }
    Ok(json!({
        "collection": T::KEY,
        "records": visible,
        "version": version,
        "branchId": scope.as_param(),
    }))
}

/// Appends under the same optimistic check as updates.
fn create<T: Scoped>(store: &RecordStore, req: &Request) -> Result<Value, HandlerErr> {
    let mut record: T = record_param(req, "record", true)?;
    let expected = opt_u64_param(req, "expectedVersion")?;
    let repo = Repo::<T>::new(store);
    let (mut all, current) = repo.list_versioned()?;
    if record.id().trim().is_empty() {
        record.set_id(uuid::Uuid::new_v4().to_string());
    } else if all.iter().any(|r| r.id() == record.id()) {
        return Err(StoreError::DuplicateId {
            key: T::KEY.to_string(),
            id: record.id().to_string(),
        }
        .into());
    }
    check_links(store, &record)?;
    all.push(record.clone());
    let version = store.save_if(T::KEY, &all, expected.unwrap_or(current))?;
    Ok(json!({ "record": record, "version": version }))
}

fn update<T: Scoped>(store: &RecordStore, req: &Request) -> Result<Value, HandlerErr> {
    let record: T = record_param(req, "record", false)?;
    let expected = opt_u64_param(req, "expectedVersion")?;
    check_links(store, &record)?;
    let repo = Repo::<T>::new(store);
    if !repo.update_checked(&record, expected)? {
        return Err(not_found(T::KEY, record.id()));
    }
    Ok(json!({ "record": record, "version": store.version_of(T::KEY)? }))
}

fn delete<T: Scoped>(store: &RecordStore, req: &Request) -> Result<Value, HandlerErr> {
    let id = str_param(req, "id")?;
    let expected = opt_u64_param(req, "expectedVersion")?;
    let Some(removed) = Repo::<T>::new(store).remove_checked(id, expected)? else {
        return Err(not_found(T::KEY, id));
    };
    Ok(json!({ "deleted": removed.id(), "version": store.version_of(T::KEY)? }))
}

fn dispatch(state: &AppState, req: &Request, op: &str) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let collection = collection_param(req)?;
    match op {
        "list" => with_collection!(collection, list(store, req)),
        "create" => with_collection!(collection, create(store, req)),
        "update" => with_collection!(collection, update(store, req)),
        _ => with_collection!(collection, delete(store, req)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "records.list" => "list",
        "records.create" => "create",
        "records.update" => "update",
        "records.delete" => "delete",
        _ => return None,
    };
    Some(respond(&req.id, dispatch(state, req, op)))
}
