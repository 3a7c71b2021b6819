//! Typed records for every stored collection.
//!
//! Field names follow the camelCase JSON the console already writes. Ids are
//! strings; older data used numeric timestamps as ids, which are accepted and
//! converted on read.

use serde::{Deserialize, Deserializer, Serialize};

pub const KEY_BRANCHES: &str = "branches";
pub const KEY_GROUPS: &str = "groups";
pub const KEY_CHILDREN: &str = "children";
pub const KEY_TEACHERS: &str = "teachers";
pub const KEY_ACCOUNTS: &str = "auth_users";
pub const KEY_MEALS: &str = "meals";
pub const KEY_VACCINES: &str = "vaccines";
pub const KEY_ACTIVITIES: &str = "activities";
pub const KEY_COMPLAINTS: &str = "complaints";
pub const KEY_ATTENDANCE: &str = "attendance";
pub const KEY_HOMEWORK: &str = "homework";
pub const KEY_SLEEP: &str = "sleep";
pub const KEY_STORAGE: &str = "storage";
pub const KEY_NOTIFICATIONS: &str = "notifications";
pub const KEY_SESSION: &str = "currentUser";
pub const KEY_SELECTED_BRANCH: &str = "selectedBranch";

/// A record stored as one element of a whole-collection slot.
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone {
    const KEY: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

macro_rules! record {
    ($ty:ty, $key:expr) => {
        impl Record for $ty {
            const KEY: &'static str = $key;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Director,
    Teacher,
    Parent,
    Superadmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Director => "director",
            Self::Teacher => "teacher",
            Self::Parent => "parent",
            Self::Superadmin => "superadmin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "director" => Some(Self::Director),
            "teacher" => Some(Self::Teacher),
            "parent" => Some(Self::Parent),
            "superadmin" => Some(Self::Superadmin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}
record!(Branch, KEY_BRANCHES);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub branch_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}
record!(Group, KEY_GROUPS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub parent_phone: Option<String>,
    /// Parent login offered on the child form; becomes a parent account.
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}
record!(Child, KEY_CHILDREN);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub branch_id: Option<String>,
    #[serde(default, deserialize_with = "id_list")]
    pub assigned_groups: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "password")]
    pub secret: Option<String>,
}
record!(Teacher, KEY_TEACHERS);

/// A login. Parent accounts reference children instead of being derived from
/// one, so one parent may hold several children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub username: String,
    #[serde(alias = "password")]
    pub secret: String,
    pub role: Role,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub teacher_id: Option<String>,
    #[serde(default, alias = "childId", deserialize_with = "id_list")]
    pub child_ids: Vec<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}
record!(Account, KEY_ACCOUNTS);

/// The persisted "who is using this console" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub display_name: String,
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub group_names: Vec<String>,
    #[serde(default)]
    pub child_names: Vec<String>,
    #[serde(default)]
    pub demo: bool,
    pub logged_in_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub date: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub child_id: Option<String>,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub menu: String,
    #[serde(default)]
    pub notes: Option<String>,
}
record!(Meal, KEY_MEALS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vaccination {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub child_id: String,
    pub vaccine: String,
    pub date: String,
    #[serde(default)]
    pub next_due: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
record!(Vaccination, KEY_VACCINES);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    pub date: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub child_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
record!(Activity, KEY_ACTIVITIES);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub date: String,
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub child_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub author_id: Option<String>,
    #[serde(default)]
    pub status: ComplaintStatus,
}
record!(Complaint, KEY_COMPLAINTS);

/// Attendance for one group on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDay {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub date: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "id_list")]
    pub present: Vec<String>,
    #[serde(default, deserialize_with = "id_list")]
    pub absent: Vec<String>,
}
record!(AttendanceDay, KEY_ATTENDANCE);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    pub date: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}
record!(Homework, KEY_HOMEWORK);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub child_id: String,
    pub date: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}
record!(SleepRecord, KEY_SLEEP);

/// Pantry/warehouse stock kept per branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageItem {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}
record!(StorageItem, KEY_STORAGE);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub date: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}
record!(Notification, KEY_NOTIFICATIONS);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
    Float(f64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Int(n) => n.to_string(),
            Self::Float(f) if f.fract() == 0.0 => format!("{}", f as i64),
            Self::Float(f) => f.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(RawId::into_string)
}

fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<RawId>::deserialize(d)?;
    Ok(raw
        .map(RawId::into_string)
        .filter(|s| !s.trim().is_empty()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RawId>),
    One(RawId),
    Null,
}

fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::Many(v) => v.into_iter().map(RawId::into_string).collect(),
        OneOrMany::One(id) => vec![id.into_string()],
        OneOrMany::Null => Vec::new(),
    })
}
