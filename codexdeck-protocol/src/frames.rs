//! Frame construction and classification
//!
//! One frame is one newline-delimited JSON document on the agent's standard
//! streams. Outgoing frames are built by the constructors here; incoming
//! frames are sorted into responses, server-initiated requests, and
//! notifications by [`IncomingFrame::classify`].

use serde_json::json;

use crate::value::JsonValue;

/// Synthesized once per session after the initialize handshake completes
pub const CONNECTED_METHOD: &str = "codex/connected";

/// Synthesized for each stdout line that fails to decode as JSON
pub const PARSE_ERROR_METHOD: &str = "codex/parseError";

/// Synthesized for each line the agent writes to stderr
pub const STDERR_METHOD: &str = "codex/stderr";

/// Build an outgoing request frame
///
/// `params` is always present on the wire; a null payload is sent as an
/// empty object.
pub fn request(id: u64, method: &str, params: JsonValue) -> JsonValue {
    let params = if params.is_null() {
        JsonValue::empty_object()
    } else {
        params
    };
    JsonValue::new(json!({
        "id": id,
        "method": method,
        "params": params.into_inner(),
    }))
}

/// Build an outgoing notification frame (no id, no reply expected)
pub fn notification(method: &str, params: Option<JsonValue>) -> JsonValue {
    match params {
        Some(params) => JsonValue::new(json!({
            "method": method,
            "params": params.into_inner(),
        })),
        None => JsonValue::new(json!({ "method": method })),
    }
}

/// Build an outgoing response to a server-initiated request
pub fn response(id: u64, result: JsonValue) -> JsonValue {
    JsonValue::new(json!({
        "id": id,
        "result": result.into_inner(),
    }))
}

/// Build the synthetic connected event emitted after a handshake
pub fn connected_event(workspace_id: &str) -> JsonValue {
    JsonValue::new(json!({
        "method": CONNECTED_METHOD,
        "params": { "workspaceId": workspace_id },
    }))
}

/// Build the synthetic diagnostic event for an undecodable frame
pub fn parse_error_event(error: &str, raw: &str) -> JsonValue {
    JsonValue::new(json!({
        "method": PARSE_ERROR_METHOD,
        "params": { "error": error, "raw": raw },
    }))
}

/// Build the synthetic diagnostic event for one stderr line
pub fn stderr_event(message: &str) -> JsonValue {
    JsonValue::new(json!({
        "method": STDERR_METHOD,
        "params": { "message": message },
    }))
}

/// A decoded incoming frame, sorted by protocol role
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingFrame {
    /// Carries an id and a result or error; resolves a pending request
    Response { id: u64, frame: JsonValue },
    /// Carries an id and a method; the server expects a reply for `id`
    ServerRequest {
        id: u64,
        method: String,
        frame: JsonValue,
    },
    /// Carries a method with no id; no reply expected
    Notification { method: String, frame: JsonValue },
    /// Carries neither a usable id nor a method
    Unclassified { frame: JsonValue },
}

impl IncomingFrame {
    /// Classify a decoded frame by the role it plays in the protocol
    ///
    /// A frame carrying an id together with both a method and a result/error
    /// is treated as a response and its method is ignored. That mirrors the
    /// agent wire behavior as observed; see DESIGN.md.
    pub fn classify(frame: JsonValue) -> Self {
        let id = frame.get("id").and_then(|v| v.as_u64());
        let has_outcome = frame.get("result").is_some() || frame.get("error").is_some();
        let method = frame
            .get("method")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match (id, has_outcome, method) {
            (Some(id), true, _) => Self::Response { id, frame },
            (Some(id), false, Some(method)) => Self::ServerRequest { id, method, frame },
            (None, _, Some(method)) => Self::Notification { method, frame },
            _ => Self::Unclassified { frame },
        }
    }
}
