use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::skip_header_row;
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::sheet;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let user_path = optional_str(req, "userDataPath").map(PathBuf::from);
    let score_path = optional_str(req, "scoreDataPath").map(PathBuf::from);
    if user_path.is_none() && score_path.is_none() {
        return err(
            &req.id,
            "bad_params",
            "userDataPath or scoreDataPath is required",
            None,
        );
    }
    let skip_header = match skip_header_row(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Parse both sheets before touching the db so a bad file changes nothing.
    let users = match user_path.as_deref().map(|p| sheet::read_user_sheet(p, skip_header)) {
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => return err(&req.id, "import_failed", format!("{e:#}"), None),
        None => None,
    };
    let scores = match score_path.as_deref().map(|p| sheet::read_score_sheet(p, skip_header)) {
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => return err(&req.id, "import_failed", format!("{e:#}"), None),
        None => None,
    };

    let (users_imported, scores_imported) =
        match db::import_sheet_rows(conn, users.as_deref(), scores.as_deref()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
        };

    info!(users = users_imported, scores = scores_imported, "sheets imported");
    ok(
        &req.id,
        json!({
            "usersImported": users_imported,
            "scoresImported": scores_imported
        }),
    )
}

fn handle_export_scores(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let rows = match db::score_rows(conn, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match sheet::write_score_sheet(&out_path, &rows) {
        Ok(n) => ok(&req.id, json!({ "rowsExported": n })),
        Err(e) => err(&req.id, "export_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sheets.import" => Some(handle_import(state, req)),
        "sheets.exportScores" => Some(handle_export_scores(state, req)),
        _ => None,
    }
}
