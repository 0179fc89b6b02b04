mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_update_and_validation() {
    let workspace = temp_dir("recordsd-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "0", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let initial = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(initial.pointer("/import/workers").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(
        initial.pointer("/import/storeTimeoutMs").and_then(|v| v.as_i64()),
        Some(5000)
    );
    let bands = initial
        .pointer("/gradeScale/bands")
        .and_then(|v| v.as_array())
        .expect("bands");
    assert_eq!(bands.len(), 6);
    assert_eq!(bands[0]["grade"].as_str(), Some("A"));
    assert_eq!(bands[0]["minScore"].as_f64(), Some(70.0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "import", "patch": { "workers": 1, "storeTimeoutMs": 2000 } }),
    );
    let after = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(after.pointer("/import/workers").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        after.pointer("/import/storeTimeoutMs").and_then(|v| v.as_i64()),
        Some(2000)
    );

    for (id, patch) in [
        ("5", json!({ "section": "import", "patch": { "workers": 0 } })),
        ("6", json!({ "section": "import", "patch": { "workers": 17 } })),
        ("7", json!({ "section": "import", "patch": { "threads": 2 } })),
        ("8", json!({ "section": "nope", "patch": {} })),
        (
            "9",
            json!({ "section": "gradeScale", "patch": { "bands": [{ "minScore": 50, "grade": "P", "points": 1 }] } }),
        ),
    ] {
        let code = request_err_code(&mut stdin, &mut reader, id, "setup.update", patch);
        assert_eq!(code, "bad_params");
    }

    let code = request_err_code(&mut stdin, &mut reader, "10", "students.frobnicate", json!({}));
    assert_eq!(code, "not_implemented");
}

#[test]
fn custom_grade_scale_drives_result_grades() {
    let workspace = temp_dir("recordsd-setup-scale");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({
            "section": "gradeScale",
            "patch": { "bands": [
                { "minScore": 0, "grade": "fail", "points": 0 },
                { "minScore": 50, "grade": "pass", "points": 1 }
            ] }
        }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.import",
        json!({
            "course": "CSC101", "department": "csc", "level": "100", "session": "2019/2020",
            "semester": "first", "credit": 3, "author": "Dr. Ade",
            "csvText": "matno,score\nCSC/1,49.5\nCSC/2,50\n"
        }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.get",
        json!({ "course": "CSC101", "session": "2019/2020", "level": "100", "semester": "first" }),
    );
    let grades = got["results"]
        .as_array()
        .expect("results")
        .iter()
        .map(|r| r["grade"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(grades, vec!["FAIL", "PASS"]);
}
