use crate::config::DaemonConfig;
use crate::store::{RecordStore, StoreError};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsSection {
    Auth,
    Appearance,
    Maps,
}

impl SettingsSection {
    pub const ALL: [Self; 3] = [Self::Auth, Self::Appearance, Self::Maps];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auth" => Some(Self::Auth),
            "appearance" => Some(Self::Appearance),
            "maps" => Some(Self::Maps),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Appearance => "appearance",
            Self::Maps => "maps",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Auth => "settings.auth",
            Self::Appearance => "settings.appearance",
            Self::Maps => "settings.maps",
        }
    }
}

fn default_section(section: SettingsSection) -> Value {
    match section {
        SettingsSection::Auth => json!({
            "demoCodesEnabled": false,
            "secretCaseInsensitive": true
        }),
        SettingsSection::Appearance => json!({
            "theme": "light",
            "darkMode": false,
            "language": "uz"
        }),
        SettingsSection::Maps => json!({
            "apiKey": null
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal settings object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nullable_string_max(v: &Value, key: &str, max_len: usize) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, max_len)?;
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(s))
}

fn parse_one_of(v: &Value, key: &str, allowed: &[&str]) -> Result<String, String> {
    let s = parse_string_max(v, key, 16)?.to_ascii_lowercase();
    if !allowed.contains(&s.as_str()) {
        return Err(format!("{} must be one of: {}", key, allowed.join(", ")));
    }
    Ok(s)
}

pub fn merge_section_patch(
    section: SettingsSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SettingsSection::Auth => match k.as_str() {
                "demoCodesEnabled" | "secretCaseInsensitive" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown auth field: {}", k)),
            },
            SettingsSection::Appearance => match k.as_str() {
                "theme" => {
                    let theme = parse_one_of(v, k, &["light", "dark", "system"])?;
                    obj.insert(k.clone(), Value::String(theme));
                }
                "darkMode" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "language" => {
                    let lang = parse_one_of(v, k, &["uz", "ru", "en"])?;
                    obj.insert(k.clone(), Value::String(lang));
                }
                _ => return Err(format!("unknown appearance field: {}", k)),
            },
            SettingsSection::Maps => match k.as_str() {
                "apiKey" => {
                    obj.insert(k.clone(), parse_nullable_string_max(v, k, 200)?);
                }
                _ => return Err(format!("unknown maps field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(store: &RecordStore, section: SettingsSection) -> Value {
    let mut current = default_section(section);
    let saved: Value = store.load_or(section.key(), Value::Null);
    if let Some(saved_obj) = saved.as_object() {
        // Best-effort apply: malformed historical values must not block the settings screen.
        let _ = merge_section_patch(section, &mut current, saved_obj);
    }
    current
}

pub fn update_section(
    store: &RecordStore,
    section: SettingsSection,
    patch: &Map<String, Value>,
) -> Result<Value, SettingsError> {
    let mut current = load_section(store, section);
    merge_section_patch(section, &mut current, patch).map_err(SettingsError::Invalid)?;
    store.save(section.key(), &current)?;
    Ok(current)
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSettings {
    pub demo_codes_enabled: bool,
    pub secret_case_insensitive: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            demo_codes_enabled: false,
            secret_case_insensitive: true,
        }
    }
}

/// Stored auth settings with the process-level override applied on top.
pub fn auth_settings(store: &RecordStore, config: &DaemonConfig) -> AuthSettings {
    let section = load_section(store, SettingsSection::Auth);
    let stored = |k: &str, default: bool| section.get(k).and_then(Value::as_bool).unwrap_or(default);
    let defaults = AuthSettings::default();
    AuthSettings {
        demo_codes_enabled: config
            .demo_codes
            .unwrap_or_else(|| stored("demoCodesEnabled", defaults.demo_codes_enabled)),
        secret_case_insensitive: stored("secretCaseInsensitive", defaults.secret_case_insensitive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_returned_for_an_empty_store() {
        let store = RecordStore::in_memory();
        let appearance = load_section(&store, SettingsSection::Appearance);
        assert_eq!(appearance["language"], "uz");
        assert_eq!(appearance["darkMode"], false);
        assert!(!auth_settings(&store, &DaemonConfig::default()).demo_codes_enabled);
    }

    #[test]
    fn patch_is_validated_and_persisted() {
        let store = RecordStore::in_memory();
        let patch = json!({ "language": "RU", "darkMode": true });
        let updated = update_section(
            &store,
            SettingsSection::Appearance,
            patch.as_object().expect("object"),
        )
        .expect("update");
        assert_eq!(updated["language"], "ru");
        assert_eq!(load_section(&store, SettingsSection::Appearance)["darkMode"], true);

        let bad = json!({ "language": "de" });
        let err = update_section(&store, SettingsSection::Appearance, bad.as_object().expect("object"))
            .expect_err("invalid language");
        assert!(matches!(err, SettingsError::Invalid(_)));

        let unknown = json!({ "fontSize": 3 });
        assert!(update_section(&store, SettingsSection::Maps, unknown.as_object().expect("object")).is_err());
    }

    #[test]
    fn process_override_wins_over_stored_auth_setting() {
        let store = RecordStore::in_memory();
        let patch = json!({ "demoCodesEnabled": true });
        update_section(&store, SettingsSection::Auth, patch.as_object().expect("object"))
            .expect("update");
        assert!(auth_settings(&store, &DaemonConfig::default()).demo_codes_enabled);

        let config = DaemonConfig {
            demo_codes: Some(false),
            ..DaemonConfig::default()
        };
        assert!(!auth_settings(&store, &config).demo_codes_enabled);
    }
}
