use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{get_required_str, require_store};
use crate::ipc::types::{AppState, Request};
use crate::rows;
use crate::store::RecordStore;
use crate::transcript;
use serde_json::{json, Value};

fn transcript_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let matno = rows::normalize_matno(&get_required_str(params, "matno")?);
    let Some(student) = store
        .find_student_by_matno(&matno)
        .map_err(HandlerErr::query)?
    else {
        return Err(HandlerErr::new(
            "not_found",
            format!("student {} not found", matno),
        ));
    };
    let scale = {
        let conn = store.conn().map_err(HandlerErr::query)?;
        setup::load_grade_scale(&conn).map_err(HandlerErr::query)?
    };
    let t = transcript::transcript_for(store, &matno, &scale).map_err(HandlerErr::query)?;

    Ok(json!({
        "student": {
            "matno": &student.matno,
            "displayName": student.display_name(),
            "department": &student.department,
            "level": student.level,
        },
        "semesters": t.semesters,
        "totalCredits": t.total_credits,
        "cgpa": t.cgpa,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "transcript.get" => Some(match transcript_get(state, &req.params) {
            Ok(result) => ok(&req.id, result),
            Err(error) => error.response(&req.id),
        }),
        _ => None,
    }
}
