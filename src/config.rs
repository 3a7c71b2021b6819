use anyhow::{anyhow, Context};
use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "KINDERGARTEND_WORKSPACE";
pub const ENV_DEMO_CODES: &str = "KINDERGARTEND_DEMO_CODES";
pub const ENV_LOG: &str = "KINDERGARTEND_LOG";
pub const ENV_LOG_FORMAT: &str = "KINDERGARTEND_LOG_FORMAT";

const DEFAULT_LOG_FILTER: &str = "kindergartend=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process-level settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Workspace to open before the first request.
    pub workspace: Option<PathBuf>,
    /// Overrides the workspace's stored `auth.demoCodesEnabled` when set.
    pub demo_codes: Option<bool>,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            demo_codes: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        if let Some(ws) = get(ENV_WORKSPACE).filter(|s| !s.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws.trim()));
        }
        if let Some(raw) = get(ENV_DEMO_CODES).filter(|s| !s.trim().is_empty()) {
            cfg.demo_codes =
                Some(parse_flag(&raw).with_context(|| format!("invalid {}", ENV_DEMO_CODES))?);
        }
        if let Some(filter) = get(ENV_LOG)
            .or_else(|| get("RUST_LOG"))
            .filter(|s| !s.trim().is_empty())
        {
            cfg.log_filter = filter;
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            cfg.log_format = match format.trim().to_ascii_lowercase().as_str() {
                "" | "text" | "pretty" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => return Err(anyhow!("invalid {}: {}", ENV_LOG_FORMAT, other)),
            };
        }
        Ok(cfg)
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean flag, got {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = DaemonConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn variables_are_read() {
        let cfg = DaemonConfig::from_lookup(lookup(&[
            (ENV_WORKSPACE, "/tmp/kg"),
            (ENV_DEMO_CODES, "Yes"),
            ("RUST_LOG", "debug"),
            (ENV_LOG_FORMAT, "json"),
        ]))
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/kg")));
        assert_eq!(cfg.demo_codes, Some(true));
        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_flag_is_rejected() {
        assert!(DaemonConfig::from_lookup(lookup(&[(ENV_DEMO_CODES, "maybe")])).is_err());
        assert!(DaemonConfig::from_lookup(lookup(&[(ENV_LOG_FORMAT, "xml")])).is_err());
    }
}
