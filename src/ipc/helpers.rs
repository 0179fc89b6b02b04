use crate::credentials::Argon2Hasher;
use crate::db::SqliteStore;
use crate::error::ImportError;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup;
use crate::ipc::types::AppState;
use crate::reconcile::{BatchContext, ReconcileOptions, Reconciler};
use crate::rows::{self, Table};
use serde_json::{json, Value};

pub fn require_store(state: &AppState) -> Result<&SqliteStore, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Import payload: a CSV file on disk (`inPath`) or inline text (`csvText`).
pub fn read_input_table(params: &Value) -> Result<Table, HandlerErr> {
    if let Some(text) = params.get("csvText").and_then(|v| v.as_str()) {
        return Ok(rows::read_table(text));
    }
    let in_path = get_required_str(params, "inPath")
        .map_err(|_| HandlerErr::bad_params("missing inPath or csvText"))?;
    let text = std::fs::read_to_string(&in_path).map_err(|e| HandlerErr {
        code: "parse_failed",
        message: format!("failed to read {}: {}", in_path, e),
        details: Some(json!({ "inPath": in_path })),
    })?;
    Ok(rows::read_table(&text))
}

fn import_failed(e: ImportError) -> HandlerErr {
    let details = match &e {
        ImportError::Schema(s) => Some(json!({ "missing": s.missing })),
        _ => None,
    };
    HandlerErr {
        code: e.code(),
        message: e.to_string(),
        details,
    }
}

/// Loads the grade scale and import tuning from the workspace, then
/// reconciles the table and renders the batch report.
pub fn run_import(store: &SqliteStore, table: &Table, ctx: &BatchContext) -> Result<Value, HandlerErr> {
    let (scale, settings) = {
        let conn = store.conn().map_err(HandlerErr::query)?;
        let scale = setup::load_grade_scale(&conn).map_err(HandlerErr::query)?;
        let settings = setup::load_import_settings(&conn).map_err(HandlerErr::query)?;
        (scale, settings)
    };
    store
        .set_timeout(settings.store_timeout)
        .map_err(HandlerErr::update)?;

    let report = Reconciler::new(store, &Argon2Hasher, &scale)
        .with_options(ReconcileOptions {
            workers: settings.workers,
            cancel: None,
        })
        .import_table(table, ctx)
        .map_err(import_failed)?;

    let mut out = serde_json::to_value(&report).map_err(|e| HandlerErr::new("parse_failed", e.to_string()))?;
    out["summary"] = Value::String(report.summary());
    out["processed"] = Value::from(report.processed());
    Ok(out)
}
