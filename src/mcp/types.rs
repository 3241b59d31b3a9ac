// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP result types for the handshake, the tool catalog, and tool calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ToolDefinition;

/// A tool exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Model-facing declaration; the schema is passed through unchanged.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.input_schema.clone())
    }
}

/// Tool entry as listed on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

impl From<WireTool> for ToolDescriptor {
    fn from(tool: WireTool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: match tool.input_schema {
                Some(Value::Null) | None => Value::Object(Default::default()),
                Some(schema) => schema,
            },
        }
    }
}

/// One page of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListToolsPage {
    pub tools: Vec<WireTool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Server identity reported in the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Result of `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Content item in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Audio {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    ResourceLink {
        uri: String,
    },
    #[serde(other)]
    Unknown,
}

impl McpContent {
    fn render(&self) -> Option<String> {
        match self {
            Self::Text { text } => Some(text.clone()),
            Self::Image { mime_type } => Some(format!("[image: {}]", mime_type)),
            Self::Audio { mime_type } => Some(format!("[audio: {}]", mime_type)),
            Self::Resource { resource } => resource
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| resource.get("uri").and_then(Value::as_str))
                .map(str::to_string),
            Self::ResourceLink { uri } => Some(uri.clone()),
            Self::Unknown => None,
        }
    }
}

/// Result of `tools/call`.
///
/// `is_error` marks a failure the server reported inside a successful
/// response; it is shown to the model rather than raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolCallResult {
    /// Create a plain text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            ..Default::default()
        }
    }

    /// Text rendering handed to the model.
    pub fn as_text(&self) -> String {
        let parts: Vec<String> = self.content.iter().filter_map(McpContent::render).collect();
        if parts.is_empty() {
            if let Some(structured) = &self.structured_content {
                return structured.to_string();
            }
        }
        parts.join("\n")
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_tool_defaults() {
        let tool: WireTool = serde_json::from_value(json!({"name": "ping", "inputSchema": null})).unwrap();
        let descriptor = ToolDescriptor::from(tool);
        assert_eq!(descriptor.description, "");
        assert_eq!(descriptor.input_schema, json!({}));
    }

    #[test]
    fn test_descriptor_to_definition_preserves_schema() {
        let schema = json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]});
        let descriptor = ToolDescriptor {
            name: "get_forecast".to_string(),
            description: "Forecast".to_string(),
            input_schema: schema.clone(),
        };
        let definition = descriptor.to_definition();
        assert_eq!(definition.name, "get_forecast");
        assert_eq!(definition.input_schema, schema);
    }

    #[test]
    fn test_call_result_text_rendering() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "file:///a", "text": "inline"}},
                {"type": "something_new"}
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.as_text(), "line one\n[image: image/png]\ninline");
        assert!(!result.is_error);
    }

    #[test]
    fn test_call_result_structured_fallback() {
        let result: ToolCallResult =
            serde_json::from_value(json!({"content": [], "structuredContent": {"temp": 4}})).unwrap();
        assert_eq!(result.as_text(), r#"{"temp":4}"#);
    }

    #[test]
    fn test_initialize_result_requires_version() {
        let missing = serde_json::from_value::<InitializeResult>(json!({"capabilities": {}}));
        assert!(missing.is_err());

        let ok: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "weather", "version": "1.0"}
        }))
        .unwrap();
        assert_eq!(ok.server_info.unwrap().name, "weather");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Ready.to_string(), "ready");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
