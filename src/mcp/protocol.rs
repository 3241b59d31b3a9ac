// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON-RPC 2.0 framing for the MCP subset this client speaks.

use serde_json::{json, Value};

use super::error::McpError;

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Build a request.
pub fn request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut message = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

/// Build a notification (no id, no reply).
pub fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
    })
}

/// Build a success reply to a server-initiated request.
pub fn reply(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build an error reply to a server-initiated request.
pub fn error_reply(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}

/// Error object carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A message read from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: Value,
        outcome: Result<Value, RpcError>,
    },
    Request {
        id: Value,
        method: String,
    },
    Notification {
        method: String,
    },
}

impl Incoming {
    /// Classify a raw message.
    pub fn parse(message: Value) -> Result<Self, McpError> {
        let Value::Object(mut map) = message else {
            return Err(McpError::protocol(format!("expected a JSON-RPC object, got {}", message)));
        };

        let method = map.get("method").and_then(Value::as_str).map(str::to_string);
        let id = map.remove("id").filter(|id| !id.is_null());

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request { id, method }),
            (Some(method), None) => Ok(Self::Notification { method }),
            (None, Some(id)) => {
                if let Some(error) = map.remove("error") {
                    let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string();
                    return Ok(Self::Response {
                        id,
                        outcome: Err(RpcError { code, message }),
                    });
                }
                let result = map
                    .remove("result")
                    .ok_or_else(|| McpError::protocol("response has neither result nor error"))?;
                Ok(Self::Response {
                    id,
                    outcome: Ok(result),
                })
            }
            (None, None) => Err(McpError::protocol("message has neither method nor id")),
        }
    }
}

/// Whether a response id refers to request `expected`.
pub fn id_matches(id: &Value, expected: u64) -> bool {
    match id {
        Value::Number(n) => n.as_u64() == Some(expected),
        Value::String(s) => s.parse::<u64>().ok() == Some(expected),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let msg = request(3, "tools/list", None);
        assert_eq!(msg["jsonrpc"], "2.0");
        assert_eq!(msg["id"], 3);
        assert!(msg.get("params").is_none());

        let msg = request(4, "tools/call", Some(json!({"name": "x"})));
        assert_eq!(msg["params"]["name"], "x");
    }

    #[test]
    fn test_parse_success_and_error() {
        let ok = Incoming::parse(json!({"jsonrpc": "2.0", "id": 1, "result": {"a": 1}})).unwrap();
        assert_eq!(
            ok,
            Incoming::Response {
                id: json!(1),
                outcome: Ok(json!({"a": 1}))
            }
        );

        let err = Incoming::parse(json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32602, "message": "bad"}}))
            .unwrap();
        match err {
            Incoming::Response { outcome: Err(e), .. } => {
                assert_eq!(e.code, -32602);
                assert_eq!(e.to_string(), "bad (code -32602)");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_requests_and_notifications() {
        assert_eq!(
            Incoming::parse(json!({"jsonrpc": "2.0", "id": "s1", "method": "ping"})).unwrap(),
            Incoming::Request {
                id: json!("s1"),
                method: "ping".to_string()
            }
        );
        assert_eq!(
            Incoming::parse(json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}})).unwrap(),
            Incoming::Notification {
                method: "notifications/message".to_string()
            }
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(Incoming::parse(json!([1, 2])).is_err());
        assert!(Incoming::parse(json!({"jsonrpc": "2.0"})).is_err());
        assert!(Incoming::parse(json!({"jsonrpc": "2.0", "id": 1})).is_err());
    }

    #[test]
    fn test_id_matches() {
        assert!(id_matches(&json!(5), 5));
        assert!(id_matches(&json!("5"), 5));
        assert!(!id_matches(&json!(6), 5));
        assert!(!id_matches(&json!(null), 5));
    }
}
