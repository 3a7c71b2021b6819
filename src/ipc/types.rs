use std::path::PathBuf;

use crate::config::DaemonConfig;
use crate::store::RecordStore;
use crate::sync::SyncTracker;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub store: Option<RecordStore>,
    pub sync: SyncTracker,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            workspace: None,
            store: None,
            sync: SyncTracker::new(),
        }
    }
}
