//! JSON-RPC 2.0 wire types.
//!
//! One JSON object per LF-terminated line. Messages with an `id` are
//! requests and get exactly one response with the same `id`; messages
//! without an `id` are notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Incoming request or notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Must be `"2.0"`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name (e.g. `generate`).
    pub method: String,
    /// Optional params object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Whether this message expects a response.
    pub fn is_call(&self) -> bool {
        self.id.is_some()
    }
}

/// Outgoing response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request id (`null` when the request id was unreadable).
    pub id: Value,
    /// Result payload (present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Error object inside a response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Stable integer code (JSON-RPC or application range).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Structured details; application errors carry `{"code": "<KIND>"}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing server-initiated notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Notification method name.
    pub method: String,
    /// Payload.
    pub params: Value,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Value, body: RpcErrorBody) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(body),
        }
    }
}

impl RpcNotification {
    /// Wrap a core notification for the wire.
    pub fn from_event(event: &aria_core::events::Notification) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: event.method().to_owned(),
            params: event.params(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Wire format fixtures ────────────────────────────────────────

    #[test]
    fn wire_format_request() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"generate","params":{"prompt":"lofi","duration_sec":10}}"#;
        let req: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(json!(1)));
        assert_eq!(req.method, "generate");
        assert!(req.is_call());
        assert_eq!(req.params.unwrap()["prompt"], "lofi");
    }

    #[test]
    fn wire_format_notification_has_no_id() {
        let raw = r#"{"jsonrpc":"2.0","method":"client_hint","params":{}}"#;
        let req: RpcRequest = serde_json::from_str(raw).unwrap();
        assert!(!req.is_call());
    }

    #[test]
    fn string_ids_are_preserved() {
        let raw = r#"{"jsonrpc":"2.0","id":"req-7","method":"ping"}"#;
        let req: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.id, Some(json!("req-7")));
    }

    #[test]
    fn success_response_omits_error() {
        let resp = RpcResponse::success(json!(3), json!({"status": "ok"}));
        let text = serde_json::to_string(&resp).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 3);
        assert_eq!(v["result"]["status"], "ok");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn error_response_omits_result() {
        let resp = RpcResponse::error(
            json!(4),
            RpcErrorBody {
                code: -32601,
                message: "Method 'nope' not found".into(),
                data: None,
            },
        );
        let text = serde_json::to_string(&resp).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["error"]["code"], -32601);
        assert!(v.get("result").is_none());
        assert!(v["error"].get("data").is_none());
    }

    #[test]
    fn notification_wire_shape() {
        use aria_core::events::{GenerationProgress, Notification};
        use aria_core::ids::TrackId;

        let event = Notification::Progress(GenerationProgress {
            track_id: TrackId::from_raw("00aa00aa00aa00aa"),
            percent: 42,
            current_step: 210,
            total_steps: 500,
            eta_sec: Some(8.5),
        });
        let wire = RpcNotification::from_event(&event);
        let v = serde_json::to_value(&wire).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["method"], "generation_progress");
        assert_eq!(v["params"]["percent"], 42);
        assert_eq!(v["params"]["track_id"], "00aa00aa00aa00aa");
        assert!(v.get("id").is_none(), "notifications carry no id");
    }

    #[test]
    fn response_round_trips() {
        let resp = RpcResponse::success(json!("abc"), json!({"n": 1}));
        let text = serde_json::to_string(&resp).unwrap();
        let back: RpcResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, json!("abc"));
        assert_eq!(back.result.unwrap()["n"], 1);
    }
}
