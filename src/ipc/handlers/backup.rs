use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn workspace_param(state: &AppState, req: &Request) -> Option<PathBuf> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
}

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let Some(workspace_path) = workspace_param(state, req) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path)) {
        Ok(export) => {
            info!(path = %out_path, "workspace bundle exported");
            ok(
                &req.id,
                json!({
                    "path": out_path,
                    "bundleFormat": export.bundle_format,
                    "dbSha256": export.db_sha256
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "export_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

/// Reopen after a failed import. A failure leaves the daemon without a
/// workspace and is returned for the error details.
fn reopen_workspace(state: &mut AppState, path: &Path) -> Option<String> {
    match open_workspace(state, path) {
        Ok(()) => None,
        Err(e) => {
            warn!(workspace = %path.display(), error = %e, "workspace reopen failed");
            state.workspace = None;
            Some(format!("{e:#}"))
        }
    }
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let Some(workspace_path) = workspace_param(state, req) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if !in_path.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path.to_string_lossy() })),
        );
    }

    let is_open = state.workspace.as_deref() == Some(workspace_path.as_path());
    if is_open {
        // Release the handle before the file underneath it is replaced.
        state.session = None;
        state.db = None;
    }

    let import = match backup::import_workspace_bundle(&in_path, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            let mut details = json!({ "path": in_path.to_string_lossy() });
            if is_open {
                if let Some(reopen) = reopen_workspace(state, &workspace_path) {
                    details["reopenError"] = json!(reopen);
                }
            }
            return err(&req.id, "import_failed", format!("{e:#}"), Some(details));
        }
    };

    if is_open {
        if let Some(reopen) = reopen_workspace(state, &workspace_path) {
            return err(&req.id, "db_open_failed", reopen, None);
        }
    }
    info!(workspace = %workspace_path.display(), "workspace bundle imported");
    ok(
        &req.id,
        json!({
            "workspacePath": workspace_path.to_string_lossy(),
            "bundleFormat": import.bundle_format,
            "dbSha256": import.db_sha256
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_workspace_bundle(state, req)),
        _ => None,
    }
}
