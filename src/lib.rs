// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fanout - ask every tool server at once.
//!
//! A Model Context Protocol client that connects to several tool servers,
//! runs the same user query against each server's tools in its own
//! conversation, and merges the answers with one more model call.
//!
//! # Architecture
//!
//! - [`types`] - Messages, content blocks, tool declarations, the [`Provider`] trait
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and merging
//! - [`mcp`] - Transports, target resolution, and the protocol session
//! - [`providers`] - Anthropic Messages API client
//! - [`agent`] - Conversation loop (model call / tool call cycle)
//! - [`orchestrator`] - Concurrent fan-out and answer synthesis
//! - [`trip`] - Trip-planning REST service
//! - [`telemetry`] - Logging setup and metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use fanout::agent::LoopConfig;
//! use fanout::mcp::ServerConfig;
//! use fanout::orchestrator::{Orchestrator, OrchestratorConfig};
//!
//! let provider = fanout::create_provider_from_env()?;
//! let mut orchestrator = Orchestrator::new(provider, LoopConfig::default(), OrchestratorConfig::default());
//! orchestrator
//!     .connect_all(&[ServerConfig::from_target("weather.py"), ServerConfig::from_target("maps.js")])
//!     .await;
//! println!("{}", orchestrator.query("Plan a rainy-day walk in Oslo").await?);
//! orchestrator.shutdown().await;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod providers;
pub mod telemetry;
pub mod trip;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{AgentError, ConfigError, ProviderError, Result};
pub use providers::{create_provider, create_provider_from_config, create_provider_from_env, AnthropicProvider};
pub use types::{
    ContentBlock, Message, MessageContent, Provider, ProviderConfig, ProviderResponse, Role, SharedProvider,
    StopReason, TokenUsage, ToolCall, ToolDefinition,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
