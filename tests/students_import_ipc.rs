mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, spawn_sidecar, temp_dir, write_csv};

#[test]
fn student_import_is_additive_only() {
    let workspace = temp_dir("recordsd-students-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let csv = write_csv(
        &workspace,
        "students.csv",
        "\u{feff}FirstName,LastName,Phone,Email,MatNo,Password\r\n\
         Ada,Obi,8030000001,Ada@X.com,csc/2019/01,secret1\r\n\
         Bola,Ade,08030000002,bola@x.com,csc/2019/02,secret2\r\n\
         Chi,Eze,08030000003,chi@x.com,,secret3\r\n",
    );
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({ "inPath": csv.to_string_lossy(), "department": "csc", "level": "100L" }),
    );
    assert_eq!(first["created"].as_u64(), Some(2));
    assert_eq!(first["failed"].as_u64(), Some(1));
    assert_eq!(
        first["summary"].as_str(),
        Some("Operation completed, Total added: 2, Total updated: 0, Failed: 1.")
    );

    let listed = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({}));
    let before = listed["students"].as_array().expect("students").clone();
    assert_eq!(before.len(), 2);
    let ada = before
        .iter()
        .find(|s| s["matno"] == "CSC/2019/01")
        .expect("ada");
    assert_eq!(ada["email"].as_str(), Some("ada@x.com"));
    assert_eq!(ada["phone"].as_str(), Some("08030000001"));
    assert_eq!(ada["department"].as_str(), Some("CSC"));
    assert_eq!(ada["level"].as_str(), Some("100"));
    assert!(ada.get("passwordHash").is_none());

    // Same people under new details: matched by email or matno, never overwritten.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.import",
        json!({
            "csvText": "firstname,lastname,phone,email,matno,password\n\
                        Changed,Name,08039999999,ada@x.com,CSC/2019/99,other1\n\
                        Other,Person,08039999998,new@x.com,csc/2019/02,other2\n",
            "department": "mth",
            "level": "200"
        }),
    );
    assert_eq!(second["created"].as_u64(), Some(0));
    assert_eq!(second["updatedOrDuplicate"].as_u64(), Some(2));

    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(listed["students"].as_array(), Some(&before));
}

#[test]
fn student_import_validates_inputs() {
    let workspace = temp_dir("recordsd-students-validate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({ "csvText": "matno,email\n", "department": "csc", "level": "100" }),
    );
    assert_eq!(code, "schema_error");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "students.import",
        json!({ "csvText": "", "department": "csc", "level": "100" }),
    );
    assert_eq!(code, "schema_error");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "students.import",
        json!({ "csvText": "matno\n", "department": "csc", "level": "700" }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "students.import",
        json!({ "department": "csc", "level": "100" }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "students.import",
        json!({
            "inPath": workspace.join("missing.csv").to_string_lossy(),
            "department": "csc",
            "level": "100"
        }),
    );
    assert_eq!(code, "parse_failed");
}
