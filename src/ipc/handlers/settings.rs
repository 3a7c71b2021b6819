use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{opt_str_param, store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, auth_settings, SettingsSection};
use serde_json::{json, Map, Value};

fn section_param(name: &str) -> Result<SettingsSection, HandlerErr> {
    SettingsSection::parse(name).ok_or_else(|| {
        HandlerErr::new("bad_params", format!("unknown settings section: {}", name))
    })
}

fn get(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    if let Some(name) = opt_str_param(req, "section") {
        let section = section_param(name)?;
        return Ok(json!({
            "section": section.name(),
            "settings": settings::load_section(store, section),
        }));
    }
    let mut sections = Map::new();
    for section in SettingsSection::ALL {
        sections.insert(
            section.name().to_string(),
            settings::load_section(store, section),
        );
    }
    let effective = auth_settings(store, &state.config);
    Ok(json!({
        "sections": sections,
        "effective": {
            "demoCodesEnabled": effective.demo_codes_enabled,
            "demoCodesForced": state.config.demo_codes.is_some(),
        }
    }))
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = store(state)?;
    let section = section_param(str_param(req, "section")?)?;
    let Some(patch) = req.params.get("patch").and_then(Value::as_object) else {
        return Err(HandlerErr::new("bad_params", "params.patch must be an object"));
    };
    let updated = settings::update_section(store, section, patch)?;
    Ok(json!({ "section": section.name(), "settings": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.get" => get(state, req),
        "settings.update" => update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
