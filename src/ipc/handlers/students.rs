use crate::academic::Level;
use crate::credentials::{Argon2Hasher, CredentialHasher, MIN_PASSWORD_LEN};
use crate::db::SqliteStore;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, read_input_table, require_store, run_import,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{BatchContext, StudentBatch};
use crate::rows;
use crate::store::{NewStudent, RecordStore, StudentPatch, StudentRecord};
use serde_json::{json, Value};
use tracing::info;

const MATNO_LEN: usize = 10;
const PHONE_LEN: usize = 11;

fn parse_level(params: &Value) -> Result<Level, HandlerErr> {
    let raw = get_required_str(params, "level")?;
    Level::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("level must be one of: 100, 200, 300, 400, 500, 600")
    })
}

fn parse_phone(params: &Value) -> Result<String, HandlerErr> {
    let phone = rows::normalize_phone(&get_required_str(params, "phone")?);
    if phone.chars().count() != PHONE_LEN {
        return Err(HandlerErr::bad_params(format!(
            "phone must be {} characters",
            PHONE_LEN
        )));
    }
    Ok(phone)
}

fn student_json(s: &StudentRecord) -> Result<Value, HandlerErr> {
    let mut v = serde_json::to_value(s).map_err(HandlerErr::query)?;
    v["displayName"] = Value::String(s.display_name());
    Ok(v)
}

fn find_existing(store: &SqliteStore, matno: &str) -> Result<StudentRecord, HandlerErr> {
    store
        .find_student_by_matno(matno)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::new("not_found", format!("student {} not found", matno)))
}

fn hash_password(password: &str) -> Result<String, HandlerErr> {
    Argon2Hasher
        .hash(password)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))
}

fn students_import(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let department = params.get("department").and_then(|v| v.as_str()).unwrap_or("");
    let level = params.get("level").and_then(|v| v.as_str()).unwrap_or("");
    let batch = StudentBatch::new(department, level)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let table = read_input_table(params)?;
    run_import(store, &table, &BatchContext::Students(batch))
}

fn students_create(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let first_name = get_required_str(params, "firstname")?;
    let last_name = get_required_str(params, "lastname")?;
    let department = get_required_str(params, "department")?.to_ascii_uppercase();
    let level = parse_level(params)?;
    let email = rows::normalize_email(&get_required_str(params, "email")?);
    let password = get_required_str(params, "password")?;
    let matno = rows::normalize_matno(&get_required_str(params, "matno")?);
    if matno.chars().count() != MATNO_LEN {
        return Err(HandlerErr::bad_params(format!(
            "matno must be {} characters",
            MATNO_LEN
        )));
    }
    let phone = parse_phone(params)?;

    if store
        .find_student(&email, &matno)
        .map_err(HandlerErr::query)?
        .is_some()
    {
        return Err(HandlerErr::new(
            "duplicate_key",
            "a student with this email or matric number already exists",
        ));
    }

    let password_hash = hash_password(&password)?;
    store
        .create_student(&NewStudent {
            matno: matno.clone(),
            first_name,
            middle_name: get_optional_str(params, "middlename"),
            last_name,
            department,
            level,
            phone,
            email,
            password_hash,
        })
        .map_err(HandlerErr::update)?;
    info!(matno = %matno, "student registered");

    let created = find_existing(store, &matno)?;
    Ok(json!({ "student": student_json(&created)? }))
}

fn students_list(store: &SqliteStore) -> Result<Value, HandlerErr> {
    let students = store
        .list_students()
        .map_err(HandlerErr::query)?
        .iter()
        .map(student_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

fn students_get(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let matno = rows::normalize_matno(&get_required_str(params, "matno")?);
    let student = find_existing(store, &matno)?;
    Ok(json!({ "student": student_json(&student)? }))
}

fn students_update(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let matno = rows::normalize_matno(&get_required_str(params, "matno")?);
    find_existing(store, &matno)?;

    let first_name = get_required_str(params, "firstname")?;
    let last_name = get_required_str(params, "lastname")?;
    let level = parse_level(params)?;
    let phone = parse_phone(params)?;
    let email = rows::normalize_email(&get_required_str(params, "email")?);
    let password_hash = match get_optional_str(params, "password") {
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
            return Err(HandlerErr::bad_params(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Some(p) => Some(hash_password(&p)?),
        None => None,
    };

    if let Some(other) = store
        .find_student_by_email(&email)
        .map_err(HandlerErr::query)?
    {
        if other.matno != matno {
            return Err(HandlerErr::new(
                "duplicate_key",
                "email is already used by another student",
            ));
        }
    }

    store
        .update_student(
            &matno,
            &StudentPatch {
                first_name,
                middle_name: get_optional_str(params, "middlename"),
                last_name,
                level,
                phone,
                email,
                password_hash,
            },
        )
        .map_err(HandlerErr::update)?;

    let updated = find_existing(store, &matno)?;
    Ok(json!({ "student": student_json(&updated)? }))
}

fn students_delete(store: &SqliteStore, params: &Value) -> Result<Value, HandlerErr> {
    let matno = rows::normalize_matno(&get_required_str(params, "matno")?);
    let deleted = store.delete_student(&matno).map_err(HandlerErr::update)?;
    if deleted {
        info!(matno = %matno, "student deleted");
    }
    Ok(json!({ "deleted": deleted }))
}

fn dispatch(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    match req.method.as_str() {
        "students.import" => students_import(store, &req.params),
        "students.create" => students_create(store, &req.params),
        "students.list" => students_list(store),
        "students.get" => students_get(store, &req.params),
        "students.update" => students_update(store, &req.params),
        "students.delete" => students_delete(store, &req.params),
        other => Err(HandlerErr::new(
            "not_implemented",
            format!("unknown method: {}", other),
        )),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.import" | "students.create" | "students.list" | "students.get"
        | "students.update" | "students.delete" => Some(match dispatch(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(error) => error.response(&req.id),
        }),
        _ => None,
    }
}
