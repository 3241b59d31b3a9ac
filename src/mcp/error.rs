// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP error types.

use thiserror::Error;

/// Errors that can occur while talking to a tool server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Bad server target or server entry; fatal to that connection attempt only.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Process, pipe, or network failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed handshake, catalog, or JSON-RPC message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server-reported tool failure or stream loss mid-call.
    #[error("Tool call '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    /// Operation invoked in the wrong session lifecycle state.
    #[error("Cannot {operation} while session is {state}")]
    State { operation: String, state: String },
}

impl McpError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a tool invocation error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a lifecycle state error.
    pub fn state(operation: impl Into<String>, state: impl ToString) -> Self {
        Self::State {
            operation: operation.into(),
            state: state.to_string(),
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::tool_failed("get_forecast", "server exploded");
        assert!(err.to_string().contains("get_forecast"));
        assert!(err.to_string().contains("server exploded"));

        let err = McpError::state("call tools", "closed");
        assert_eq!(err.to_string(), "Cannot call tools while session is closed");
    }

    #[test]
    fn test_conversions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(McpError::from(io_err), McpError::Transport(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(McpError::from(json_err), McpError::Protocol(_)));
    }
}
