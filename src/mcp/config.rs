// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool server configuration.
//!
//! A server is usually described by a single `target` string (a script
//! path, an npm package, or a URL) and resolved by [`TransportTarget`]. An
//! explicit `command` + `args` pair bypasses resolution.
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "servers": [
//!     "weather.py",
//!     "@modelcontextprotocol/server-filesystem /tmp",
//!     {
//!       "name": "github",
//!       "target": "https://mcp.github.com/v1",
//!       "bearerToken": "${GITHUB_TOKEN}",
//!       "enabledTools": ["get_issue", "create_pr"]
//!     }
//!   ]
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::error::McpError;
use super::target::TransportTarget;

/// Configuration for a single tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Display label; defaults to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Script path, package identifier (with optional arguments), or URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Explicit program to spawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for `command`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Force a transport kind for URL targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportType>,

    /// Whether this server is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Handshake timeout in seconds (0 disables).
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_sec: u64,

    /// Tool call timeout in seconds (0 disables).
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_sec: u64,

    /// Only expose these tools (empty means all).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_tools: Vec<String>,

    /// Never expose these tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_tools: Vec<String>,

    /// Extra environment for spawned servers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Working directory for spawned servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Bearer token for remote servers (supports `${ENV_VAR}` expansion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    300
}

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern"));

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: None,
            target: None,
            command: None,
            args: Vec::new(),
            transport: None,
            enabled: true,
            startup_timeout_sec: default_startup_timeout(),
            tool_timeout_sec: default_tool_timeout(),
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            bearer_token: None,
        }
    }
}

impl ServerConfig {
    /// Create a configuration from a target string.
    pub fn from_target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Default::default()
        }
    }

    /// Create a configuration for an explicit program.
    pub fn command(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: Some(program.into()),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the display label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set environment variables.
    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Set working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set enabled tools.
    pub fn with_enabled_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set disabled tools.
    pub fn with_disabled_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set the tool call timeout.
    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_sec = secs;
        self
    }

    /// Human-readable label for logs and synthesis.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(target) = &self.target {
            return target.clone();
        }
        match &self.command {
            Some(cmd) if self.args.is_empty() => cmd.clone(),
            Some(cmd) => format!("{} {}", cmd, self.args.join(" ")),
            None => "<unnamed>".to_string(),
        }
    }

    /// Resolve where and how to connect.
    pub fn resolve(&self) -> Result<TransportTarget, McpError> {
        if let Some(program) = &self.command {
            if program.trim().is_empty() {
                return Err(McpError::config("empty command"));
            }
            return Ok(TransportTarget::Process {
                program: program.clone(),
                args: self.args.clone(),
            });
        }

        let target = self
            .target
            .as_deref()
            .ok_or_else(|| McpError::config("server entry needs a target or a command"))?;
        let resolved = TransportTarget::resolve(target)?;

        match (resolved, self.transport) {
            (TransportTarget::StreamableHttp { url } | TransportTarget::Sse { url }, Some(TransportType::Sse)) => {
                Ok(TransportTarget::Sse { url })
            }
            (TransportTarget::StreamableHttp { url } | TransportTarget::Sse { url }, Some(TransportType::Http)) => {
                Ok(TransportTarget::StreamableHttp { url })
            }
            (TransportTarget::Process { .. }, Some(kind)) if kind != TransportType::Stdio => Err(
                McpError::config(format!("transport '{}' requires a URL target, got '{}'", kind, target)),
            ),
            (resolved, _) => Ok(resolved),
        }
    }

    /// Check if a tool is exposed to the model.
    pub fn is_tool_enabled(&self, tool_name: &str) -> bool {
        if self.disabled_tools.iter().any(|t| t == tool_name) {
            return false;
        }
        self.enabled_tools.is_empty() || self.enabled_tools.iter().any(|t| t == tool_name)
    }

    /// Bearer token with `${VAR}` references replaced from the environment.
    pub fn expanded_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_ref().map(|token| {
            ENV_VAR
                .replace_all(token, |caps: &regex::Captures<'_>| {
                    std::env::var(&caps[1]).unwrap_or_default()
                })
                .into_owned()
        })
    }

    /// Handshake timeout, if any.
    pub fn startup_timeout(&self) -> Option<Duration> {
        (self.startup_timeout_sec > 0).then(|| Duration::from_secs(self.startup_timeout_sec))
    }

    /// Per-call timeout, if any.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_sec > 0).then(|| Duration::from_secs(self.tool_timeout_sec))
    }
}

/// Transport kind for a tool server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Child process over stdin/stdout.
    Stdio,

    /// Streamable HTTP.
    Http,

    /// Legacy HTTP + Server-Sent Events.
    Sse,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_entry() {
        let json = r#"
        {
            "name": "github",
            "target": "https://mcp.github.com/v1",
            "bearerToken": "${GITHUB_TOKEN}",
            "enabledTools": ["get_issue"],
            "toolTimeoutSec": 20
        }
        "#;

        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.label(), "github");
        assert!(config.enabled);
        assert_eq!(config.startup_timeout_sec, 30);
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(20)));
        assert!(config.is_tool_enabled("get_issue"));
        assert!(!config.is_tool_enabled("delete_repo"));
    }

    #[test]
    fn test_label_fallbacks() {
        assert_eq!(ServerConfig::from_target("weather.py").label(), "weather.py");
        assert_eq!(
            ServerConfig::command("uvx", ["mcp-server-time"]).label(),
            "uvx mcp-server-time"
        );
    }

    #[test]
    fn test_tool_filtering() {
        let config = ServerConfig::from_target("x.py")
            .with_enabled_tools(["read_file", "write_file"])
            .with_disabled_tools(["write_file"]);

        assert!(config.is_tool_enabled("read_file"));
        assert!(!config.is_tool_enabled("write_file"));
        assert!(!config.is_tool_enabled("delete_file"));

        assert!(ServerConfig::from_target("x.py").is_tool_enabled("any_tool"));
    }

    #[test]
    fn test_resolve_explicit_command() {
        let config = ServerConfig::command("uvx", ["mcp-server-time"]);
        assert_eq!(
            config.resolve().unwrap(),
            TransportTarget::Process {
                program: "uvx".to_string(),
                args: vec!["mcp-server-time".to_string()],
            }
        );
    }

    #[test]
    fn test_resolve_transport_override() {
        let mut config = ServerConfig::from_target("https://host/mcp");
        config.transport = Some(TransportType::Sse);
        assert!(matches!(config.resolve().unwrap(), TransportTarget::Sse { .. }));

        let mut config = ServerConfig::from_target("weather.py");
        config.transport = Some(TransportType::Http);
        assert!(matches!(config.resolve(), Err(McpError::Configuration(_))));
    }

    #[test]
    fn test_resolve_requires_target() {
        let config = ServerConfig::default();
        assert!(matches!(config.resolve(), Err(McpError::Configuration(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("FANOUT_TEST_TOKEN", "my_secret_token");
        }

        let config = ServerConfig::from_target("https://api.example.com")
            .with_bearer_token("Bearer-${FANOUT_TEST_TOKEN}");
        assert_eq!(
            config.expanded_bearer_token().as_deref(),
            Some("Bearer-my_secret_token")
        );

        // SAFETY: cleanup after test
        unsafe {
            std::env::remove_var("FANOUT_TEST_TOKEN");
        }
    }

    #[test]
    fn test_disabled_timeouts() {
        let mut config = ServerConfig::from_target("x.py");
        config.startup_timeout_sec = 0;
        config.tool_timeout_sec = 0;
        assert_eq!(config.startup_timeout(), None);
        assert_eq!(config.tool_timeout(), None);
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(TransportType::Stdio.to_string(), "stdio");
        assert_eq!(TransportType::Http.to_string(), "http");
        assert_eq!(TransportType::Sse.to_string(), "sse");
    }
}
