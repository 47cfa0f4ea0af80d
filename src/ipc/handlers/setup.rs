use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_AVERAGE_LABEL: &str = "Average of all divisions";

#[derive(Clone, Copy)]
enum SetupSection {
    Dashboard,
    Exchange,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "dashboard" => Some(Self::Dashboard),
            "exchange" => Some(Self::Exchange),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Dashboard => "setup.dashboard",
            Self::Exchange => "setup.exchange",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Dashboard => json!({
            "defaultRankingLimit": 10,
            "averageLabel": DEFAULT_AVERAGE_LABEL
        }),
        SetupSection::Exchange => json!({
            "skipHeaderRow": true
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_label(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.chars().count() > max_len {
        return Err(format!("{} must be at most {} chars", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Dashboard => match k.as_str() {
                "defaultRankingLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 1000)?));
                }
                "averageLabel" => {
                    obj.insert(k.clone(), Value::String(parse_label(v, k, 80)?));
                }
                _ => return Err(format!("unknown dashboard field: {}", k)),
            },
            SetupSection::Exchange => match k.as_str() {
                "skipHeaderRow" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown exchange field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub default_ranking_limit: usize,
    pub average_label: String,
}

pub fn dashboard_settings(conn: &Connection) -> anyhow::Result<DashboardSettings> {
    let v = load_section(conn, SetupSection::Dashboard)?;
    Ok(DashboardSettings {
        default_ranking_limit: v
            .get("defaultRankingLimit")
            .and_then(|n| n.as_u64())
            .unwrap_or(10) as usize,
        average_label: v
            .get("averageLabel")
            .and_then(|s| s.as_str())
            .unwrap_or(DEFAULT_AVERAGE_LABEL)
            .to_string(),
    })
}

pub fn skip_header_row(conn: &Connection) -> anyhow::Result<bool> {
    let v = load_section(conn, SetupSection::Exchange)?;
    Ok(v.get("skipHeaderRow").and_then(|b| b.as_bool()).unwrap_or(true))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let dashboard = match load_section(conn, SetupSection::Dashboard) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let exchange = match load_section(conn, SetupSection::Exchange) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "dashboard": dashboard,
            "exchange": exchange
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
