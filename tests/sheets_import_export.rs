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


fn write_user_sheet(dir: &PathBuf) -> PathBuf {
    let p = dir.join("UserData.csv");
    std::fs::write(
        &p,
        "username,password,division,isAdmin\n\
         boss,admin123,Admin,TRUE\n\
         fin1,f1,Finance,FALSE\n\
         hr1,h1,HR,FALSE\n\
         fin2,f2,Finance,FALSE\n\
         aud1,a1,Audit,false\n\
         chief,c1,Board,true\n",
    )
    .expect("write user sheet");
    p
}

fn write_score_sheet(dir: &PathBuf) -> PathBuf {
    let p = dir.join("ScoreData.csv");
    std::fs::write(
        &p,
        "division,quarter,score1,score2,score3,score4,score5,comment\n\
         Finance,1,15,15,15,15,,steady\n\
         HR,1,10,12,,14,,\n\
         ,2,1,1,1,1,1,orphan\n\
         Audit,9,1,1,1,1,1,bad quarter\n\
         Finance,4,20,20,20,20,20,\"strong, close\"\n",
    )
    .expect("write score sheet");
    p
}

#[test]
fn score_sheet_import_then_export() {
    let workspace = temp_dir("scorecard-sheets");
    let sheets = temp_dir("scorecard-sheets-files");
    let user_sheet = write_user_sheet(&sheets);
    let score_sheet = write_score_sheet(&sheets);
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sheets.import",
        json!({
            "userDataPath": user_sheet.to_string_lossy(),
            "scoreDataPath": score_sheet.to_string_lossy()
        }),
    );
    assert_eq!(imported["scoresImported"], json!(3));

    let scores = request_ok(&mut stdin, &mut reader, "3", "getScores", json!({}));
    assert_eq!(scores["HR"]["quarters"]["1"]["scores"]["3"], json!(0.0));
    assert_eq!(scores["Finance"]["quarters"]["4"]["comment"], json!("strong, close"));
    assert!(scores.get("Audit").is_none());

    let out = sheets.join("export").join("ScoreData.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sheets.exportScores",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported["rowsExported"], json!(3));
    let text = std::fs::read_to_string(&out).expect("read export");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "division,quarter,score1,score2,score3,score4,score5,comment"
    );
    assert_eq!(lines[1], "Finance,1,15,15,15,15,,steady");
    assert_eq!(lines.len(), 4);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(sheets);
}

#[test]
fn import_requires_a_path_and_a_readable_file() {
    let workspace = temp_dir("scorecard-sheets-errors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let missing = request(&mut stdin, &mut reader, "2", "sheets.import", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));

    let absent = request(
        &mut stdin,
        &mut reader,
        "3",
        "sheets.import",
        json!({ "userDataPath": workspace.join("nope.csv").to_string_lossy() }),
    );
    assert_eq!(error_code(&absent), Some("import_failed"));

    let _ = std::fs::remove_dir_all(workspace);
}
