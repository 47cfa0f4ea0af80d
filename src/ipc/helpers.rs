use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::{Quarter, ScoreSet};
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn parse_quarter(req: &Request) -> Result<Quarter, serde_json::Value> {
    let raw = req.params.get("quarter");
    let n = raw.and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
    });
    n.and_then(Quarter::new).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "quarter must be an integer in 1..=4",
            raw.map(|v| json!({ "quarter": v })),
        )
    })
}

/// Scores arrive as `{"1": n, ..., "5": n}`; values are clamped to [0, 20].
pub fn parse_scores(req: &Request) -> Result<ScoreSet, serde_json::Value> {
    let Some(raw) = req.params.get("scores") else {
        return Err(err(&req.id, "bad_params", "missing scores", None));
    };
    serde_json::from_value::<ScoreSet>(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("invalid scores: {}", e), None))
}

/// `0` and absent both mean "no truncation".
pub fn parse_limit(req: &Request, key: &str) -> Result<Option<usize>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n as usize)),
            None => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a non-negative integer", key),
                None,
            )),
        },
    }
}
