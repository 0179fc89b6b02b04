use crate::academic::{Level, Semester};
use crate::db::SqliteStore;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, read_input_table, require_store, run_import};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{BatchContext, ResultBatch};
use crate::rows;
use crate::store::{OfferingKey, RecordStore};
use serde_json::{json, Value};
use tracing::info;

fn str_param<'a>(params: &'a Value, key: &str) -> &'a str {
    params.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// The four-part key identifying one course offering.
fn offering_key(params: &Value) -> Result<OfferingKey, HandlerErr> {
    let course = rows::normalize_course(&get_required_str(params, "course")?);
    let session = get_required_str(params, "session")?;
    let level = Level::parse(&get_required_str(params, "level")?).ok_or_else(|| {
        HandlerErr::bad_params("level must be one of: 100, 200, 300, 400, 500, 600")
    })?;
    let semester = Semester::parse(&get_required_str(params, "semester")?)
        .ok_or_else(|| HandlerErr::bad_params("semester must be one of: first, second"))?;
    Ok(OfferingKey {
        course,
        session,
        level,
        semester,
    })
}

fn results_import(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let credit = params
        .get("credit")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .ok_or_else(|| HandlerErr::bad_params("credit must be a positive integer"))?;
    let batch = ResultBatch::new(
        str_param(params, "course"),
        str_param(params, "department"),
        str_param(params, "level"),
        str_param(params, "session"),
        str_param(params, "semester"),
        credit,
        str_param(params, "author"),
    )
    .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let table = read_input_table(params)?;
    run_import(store, &table, &BatchContext::Results(batch))
}

fn results_lists(store: &SqliteStore) -> Result<Value, HandlerErr> {
    let lists = store.list_offerings().map_err(HandlerErr::query)?;
    Ok(json!({ "lists": lists }))
}

fn results_get(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let key = offering_key(params)?;
    let Some(offering) = store.find_offering(&key).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::new("not_found", "result list not found"));
    };
    let results = store.results_for_offering(&key).map_err(HandlerErr::query)?;
    Ok(json!({ "list": offering, "results": results }))
}

fn results_delete(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let key = offering_key(params)?;
    let deleted = store.delete_offering(&key).map_err(HandlerErr::update)?;
    info!(
        course = %key.course,
        session = %key.session,
        semester = key.semester.as_str(),
        results = deleted.results,
        "result list deleted"
    );
    Ok(json!({ "deleted": deleted }))
}

fn results_delete_one(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let key = offering_key(params)?.result_key(&rows::normalize_matno(&get_required_str(
        params, "matno",
    )?));
    let deleted = store.delete_result(&key).map_err(HandlerErr::update)?;
    Ok(json!({ "deleted": deleted }))
}

fn dispatch(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    match req.method.as_str() {
        "results.import" => results_import(store, &req.params),
        "results.lists" => results_lists(store),
        "results.get" => results_get(store, &req.params),
        "results.delete" => results_delete(store, &req.params),
        "results.deleteOne" => results_delete_one(store, &req.params),
        other => Err(HandlerErr::new(
            "not_implemented",
            format!("unknown method: {}", other),
        )),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.import" | "results.lists" | "results.get" | "results.delete"
        | "results.deleteOne" => Some(match dispatch(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(error) => error.response(&req.id),
        }),
        _ => None,
    }
}
