use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::dashboard_settings;
use crate::ipc::helpers::{db_conn, parse_limit, parse_quarter, parse_scores};
use crate::ipc::types::{AppState, Request};
use crate::session::{ScoreSession, SessionError};
use serde_json::json;

fn session_error(req: &Request, e: SessionError) -> serde_json::Value {
    let code = match &e {
        SessionError::Forbidden | SessionError::NotEditable => "forbidden",
        SessionError::UnknownDivision(_) => "not_found",
        SessionError::NoUnsyncedChange(_) => "bad_params",
        SessionError::Backend(_) => "save_failed",
    };
    err(&req.id, code, e.to_string(), None)
}

fn no_session(req: &Request) -> serde_json::Value {
    err(&req.id, "bad_params", "no active session", None)
}

fn entries_json(session: &ScoreSession) -> serde_json::Value {
    json!({
        "entries": session.entries(),
        "selected": session.selected_name(),
    })
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let username = req
        .params
        .get("username")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let settings = match dashboard_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match ScoreSession::open(conn, username, password, &settings.average_label) {
        Ok(Some(session)) => {
            let mut result = entries_json(&session);
            result["user"] = json!(session.user());
            state.session = Some(session);
            ok(&req.id, result)
        }
        Ok(None) => {
            state.session = None;
            ok(&req.id, serde_json::Value::Null)
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_entries(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.as_ref() {
        Some(s) => ok(&req.id, entries_json(s)),
        None => no_session(req),
    }
}

fn handle_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_session(req);
    };
    let aggregate = req
        .params
        .get("aggregate")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let res = if aggregate {
        session.select_aggregate()
    } else {
        match req.params.get("division").and_then(|v| v.as_str()) {
            Some(d) => session.select_division(d),
            None => return err(&req.id, "bad_params", "missing division", None),
        }
    };
    match res {
        Ok(()) => ok(&req.id, json!({ "selected": session.selected_name() })),
        Err(e) => session_error(req, e),
    }
}

fn handle_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.as_ref() {
        Some(s) => ok(&req.id, json!(s.view())),
        None => no_session(req),
    }
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let limit = match parse_limit(req, "rankingLimit") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(session) = state.session.as_ref() else {
        return no_session(req);
    };
    let limit = match limit {
        Some(n) => Some(n),
        None => match state.db.as_ref().map(dashboard_settings).transpose() {
            Ok(settings) => settings.map(|s| s.default_ranking_limit),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
    };
    ok(&req.id, json!(session.dashboard(limit)))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let quarter = match parse_quarter(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scores = match parse_scores(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let comment = req
        .params
        .get("comment")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let Some(session) = state.session.as_mut() else {
        return no_session(req);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match session.save(conn, quarter, scores, &comment) {
        Ok(()) => ok(&req.id, json!({ "success": true, "view": session.view() })),
        Err(e) => session_error(req, e),
    }
}

fn handle_revert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let quarter = match parse_quarter(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(session) = state.session.as_mut() else {
        return no_session(req);
    };
    match session.revert(quarter) {
        Ok(()) => ok(&req.id, json!(session.view())),
        Err(e) => session_error(req, e),
    }
}

fn handle_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let closed = state.session.take().is_some();
    ok(&req.id, json!({ "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_open(state, req)),
        "session.entries" => Some(handle_entries(state, req)),
        "session.select" => Some(handle_select(state, req)),
        "session.view" => Some(handle_view(state, req)),
        "session.dashboard" => Some(handle_dashboard(state, req)),
        "session.save" => Some(handle_save(state, req)),
        "session.revert" => Some(handle_revert(state, req)),
        "session.close" => Some(handle_close(state, req)),
        _ => None,
    }
}
