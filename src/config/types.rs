// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types.

use serde::{Deserialize, Serialize};

use crate::agent::DEFAULT_MAX_TOOL_DEPTH;
use crate::error::ConfigError;
use crate::mcp::ServerConfig;
use crate::providers::DEFAULT_MODEL;
use crate::providers::anthropic::DEFAULT_MAX_TOKENS;
use crate::trip::TripConfig;

/// A server as written in a config file: a bare target string or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerEntry {
    Target(String),
    Config(ServerConfig),
}

impl ServerEntry {
    /// Expand into a full server configuration.
    pub fn into_config(self) -> ServerConfig {
        match self {
            Self::Target(target) => ServerConfig::from_target(target),
            Self::Config(config) => config,
        }
    }
}

/// Trip service overrides; unset keys keep the lower layer's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maps_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flights_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotels_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_validation: Option<bool>,
}

impl TripSection {
    /// Overlay the keys set in this section onto `trip`.
    pub fn apply(&self, trip: &mut TripConfig) {
        if let Some(ref bind) = self.bind {
            trip.bind = bind.clone();
        }
        if let Some(ref url) = self.maps_url {
            trip.maps_url = url.clone();
        }
        if let Some(ref url) = self.flights_url {
            trip.flights_url = url.clone();
        }
        if let Some(ref url) = self.hotels_url {
            trip.hotels_url = url.clone();
        }
        if let Some(ref url) = self.transport_url {
            trip.transport_url = url.clone();
        }
        if let Some(strict) = self.strict_validation {
            trip.strict_validation = strict;
        }
        if let Some(secs) = self.timeout_sec {
            trip.timeout_sec = secs;
        }
    }
}

/// One configuration file (global, workspace, or local).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Anthropic API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Token budget per model call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt for every conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Tool servers to connect. Replaces the list from lower layers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<ServerEntry>>,

    /// Maximum nesting of follow-up model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_depth: Option<usize>,

    /// Per-server time budget for one query (0 disables).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_timeout_sec: Option<u64>,

    /// Run the synthesis call even with a single server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesize_single: Option<bool>,

    /// Trip service settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip: Option<TripSection>,
}

/// Fully merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub servers: Vec<ServerConfig>,
    pub max_tool_depth: usize,
    pub branch_timeout_sec: u64,
    pub synthesize_single: bool,
    pub trip: TripConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            system_prompt: None,
            servers: Vec::new(),
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            branch_timeout_sec: 300,
            synthesize_single: true,
            trip: TripConfig::default(),
        }
    }
}

impl ResolvedConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "model".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maxTokens".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::InvalidValue {
                    field: "temperature".to_string(),
                    message: format!("{} is outside 0.0..=1.0", t),
                });
            }
        }
        for server in &self.servers {
            server.resolve().map_err(|e| ConfigError::InvalidValue {
                field: "servers".to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}
