use crate::db;
use crate::grades::{reference_bands, GradeBand, GradeScale};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{DEFAULT_WORKERS, MAX_WORKERS};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const DEFAULT_STORE_TIMEOUT_MS: i64 = 5000;

#[derive(Clone, Copy)]
enum SetupSection {
    GradeScale,
    Import,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "gradeScale" => Some(Self::GradeScale),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::GradeScale => "setup.gradeScale",
            Self::Import => "setup.import",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::GradeScale => json!({ "bands": reference_bands() }),
        SetupSection::Import => json!({
            "workers": DEFAULT_WORKERS,
            "storeTimeoutMs": DEFAULT_STORE_TIMEOUT_MS
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
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

fn parse_bands(v: &Value) -> Result<GradeScale, String> {
    let bands: Vec<GradeBand> = serde_json::from_value(v.clone())
        .map_err(|e| format!("bands must be a list of {{minScore, grade, points}}: {}", e))?;
    GradeScale::new(bands).map_err(|e| e.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::GradeScale => match k.as_str() {
                "bands" => {
                    // Stored normalized: uppercase letters, descending minimums.
                    let scale = parse_bands(v)?;
                    let bands = serde_json::to_value(scale.bands()).map_err(|e| e.to_string())?;
                    obj.insert(k.clone(), bands);
                }
                _ => return Err(format!("unknown gradeScale field: {}", k)),
            },
            SetupSection::Import => match k.as_str() {
                "workers" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, 1, MAX_WORKERS as i64)?),
                    );
                }
                "storeTimeoutMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 100, 600_000)?));
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed saved section falls back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn load_grade_scale(conn: &rusqlite::Connection) -> anyhow::Result<GradeScale> {
    let section = load_section(conn, SetupSection::GradeScale)?;
    let bands: Vec<GradeBand> = serde_json::from_value(section["bands"].clone())?;
    Ok(GradeScale::new(bands)?)
}

#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub workers: usize,
    pub store_timeout: Duration,
}

pub fn load_import_settings(conn: &rusqlite::Connection) -> anyhow::Result<ImportSettings> {
    let section = load_section(conn, SetupSection::Import)?;
    let workers = section["workers"].as_u64().unwrap_or(DEFAULT_WORKERS as u64);
    let timeout_ms = section["storeTimeoutMs"]
        .as_u64()
        .unwrap_or(DEFAULT_STORE_TIMEOUT_MS as u64);
    Ok(ImportSettings {
        workers: usize::try_from(workers).unwrap_or(DEFAULT_WORKERS),
        store_timeout: Duration::from_millis(timeout_ms),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let conn = match store.conn() {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grade_scale = match load_section(&conn, SetupSection::GradeScale) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let import = match load_section(&conn, SetupSection::Import) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "gradeScale": grade_scale,
            "import": import
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
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

    let conn = match store.conn() {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut current = match load_section(&conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(&conn, section.key(), &current) {
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
