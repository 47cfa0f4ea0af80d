use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_scorecardd");
    let mut child = Command::new(exe)
        .env_remove("SCORECARD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn scorecardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn saved_quarter_reads_back_sparse_with_total_68() {
    let workspace = temp_dir("scorecard-save-roundtrip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "saveScores",
        json!({
            "division": "Finance",
            "quarter": 2,
            "scores": { "1": 18, "2": 16, "3": 20, "4": 14, "5": 0 },
            "comment": "ok"
        }),
    );
    assert_eq!(saved, json!({ "success": true }));

    let scores = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "getScores",
        json!({ "division": "Finance" }),
    );
    let quarters = scores
        .get("Finance")
        .and_then(|d| d.get("quarters"))
        .and_then(|q| q.as_object())
        .expect("Finance quarters");
    assert_eq!(quarters.len(), 1);
    let q2 = quarters.get("2").expect("quarter 2");
    assert_eq!(q2.get("comment"), Some(&json!("ok")));
    let total: f64 = q2
        .get("scores")
        .and_then(|s| s.as_object())
        .expect("scores")
        .values()
        .filter_map(|v| v.as_f64())
        .sum();
    assert_eq!(total, 68.0);
    assert!(quarters.get("1").is_none());
    assert!(quarters.get("3").is_none());
    assert!(quarters.get("4").is_none());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn save_is_an_idempotent_upsert_with_clamping() {
    let workspace = temp_dir("scorecard-save-upsert");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let params = json!({
        "division": "HR",
        "quarter": 4,
        "scores": { "1": 25, "2": -4, "3": 10.5, "4": 20, "5": 19 },
        "comment": "year end"
    });
    let _ = request_ok(&mut stdin, &mut reader, "2", "scores.save", params.clone());
    let once = request_ok(&mut stdin, &mut reader, "3", "scores.get", json!({ "division": "HR" }));
    let _ = request_ok(&mut stdin, &mut reader, "4", "scores.save", params);
    let twice = request_ok(&mut stdin, &mut reader, "5", "scores.get", json!({ "division": "HR" }));
    assert_eq!(once, twice);

    let q4 = &twice["HR"]["quarters"]["4"];
    assert_eq!(q4["scores"]["1"], json!(20.0));
    assert_eq!(q4["scores"]["2"], json!(0.0));
    assert_eq!(q4["scores"]["3"], json!(10.5));
    assert_eq!(q4["scores"]["5"], json!(19.0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "scores.save",
        json!({
            "division": "HR",
            "quarter": 4,
            "scores": { "1": 1, "2": 1, "3": 1, "4": 1, "5": 1 },
            "comment": "revised"
        }),
    );
    let all = request_ok(&mut stdin, &mut reader, "7", "scores.get", json!({ "division": "all" }));
    assert_eq!(all.as_object().map(|m| m.len()), Some(1));
    assert_eq!(all["HR"]["quarters"]["4"]["comment"], json!("revised"));
    assert_eq!(all["HR"]["quarters"]["4"]["scores"]["1"], json!(1.0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn save_rejects_bad_params_and_reads_degrade_without_workspace() {
    let workspace = temp_dir("scorecard-save-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // No workspace yet: reads are empty, writes fail.
    let divisions = request_ok(&mut stdin, &mut reader, "1", "getDivisions", json!({}));
    assert_eq!(divisions, json!([]));
    let scores = request_ok(&mut stdin, &mut reader, "2", "getScores", json!({}));
    assert_eq!(scores, json!({}));
    let user = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "login",
        json!({ "username": "x", "password": "y" }),
    );
    assert!(user.is_null());
    let denied = request(
        &mut stdin,
        &mut reader,
        "4",
        "saveScores",
        json!({ "division": "Finance", "quarter": 1, "scores": {} }),
    );
    assert_eq!(error_code(&denied), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let bad_quarter = request(
        &mut stdin,
        &mut reader,
        "6",
        "saveScores",
        json!({ "division": "Finance", "quarter": 5, "scores": { "1": 1 } }),
    );
    assert_eq!(error_code(&bad_quarter), Some("bad_params"));
    let bad_category = request(
        &mut stdin,
        &mut reader,
        "7",
        "saveScores",
        json!({ "division": "Finance", "quarter": 1, "scores": { "6": 1 } }),
    );
    assert_eq!(error_code(&bad_category), Some("bad_params"));
    let no_division = request(
        &mut stdin,
        &mut reader,
        "8",
        "saveScores",
        json!({ "quarter": 1, "scores": { "1": 1 } }),
    );
    assert_eq!(error_code(&no_division), Some("bad_params"));

    let unknown = request(&mut stdin, &mut reader, "9", "scores.delete", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let _ = std::fs::remove_dir_all(workspace);
}
