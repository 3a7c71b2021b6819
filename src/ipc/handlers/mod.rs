pub mod auth;
pub mod backup;
pub mod branches;
pub mod children;
pub mod core;
pub mod groups;
pub mod navigation;
pub mod notifications;
pub mod records;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod teachers;
