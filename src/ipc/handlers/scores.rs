use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, parse_quarter, parse_scores, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let username = optional_str(req, "username").unwrap_or_default();
    let password = optional_str(req, "password").unwrap_or_default();
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, serde_json::Value::Null);
    };
    match db::find_user(conn, &username, &password) {
        Ok(Some(user)) => ok(&req.id, json!(user)),
        Ok(None) => {
            info!(username = %username.trim(), "login rejected");
            ok(&req.id, serde_json::Value::Null)
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_divisions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!([]));
    };
    match db::list_divisions(conn) {
        Ok(divisions) => ok(&req.id, json!(divisions)),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_scores_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({}));
    };
    let division = optional_str(req, "division").filter(|d| !d.is_empty() && d != "all");
    match db::load_scores(conn, division.as_deref()) {
        Ok(table) => ok(&req.id, json!(table)),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_scores_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let division = match required_str(req, "division") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if division.trim().is_empty() {
        return err(&req.id, "bad_params", "division must not be empty", None);
    }
    let quarter = match parse_quarter(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scores = match parse_scores(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let comment = optional_str(req, "comment").unwrap_or_default();

    match db::upsert_scores(conn, &division, quarter, &scores, &comment) {
        Ok(()) => {
            info!(division = %division, quarter = quarter.number(), "scores saved");
            ok(&req.id, json!({ "success": true }))
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" | "login" => Some(handle_login(state, req)),
        "divisions.list" | "getDivisions" => Some(handle_divisions_list(state, req)),
        "scores.get" | "getScores" => Some(handle_scores_get(state, req)),
        "scores.save" | "saveScores" => Some(handle_scores_save(state, req)),
        _ => None,
    }
}
