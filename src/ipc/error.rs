use serde::Serialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// Failure response. `code` is one of the protocol error codes
/// (`bad_params`, `no_workspace`, `not_found`, `forbidden`, ...).
pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let body = ErrorBody {
        code,
        message: message.into(),
        details,
    };
    warn!(request_id = id, code, message = %body.message, "request failed");
    json!({ "id": id, "ok": false, "error": body })
}
