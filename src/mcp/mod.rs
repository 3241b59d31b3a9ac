// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model Context Protocol client.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────┐
//! │  McpSession   │  │  McpSession   │  │  McpSession   │
//! │ (weather.py)  │  │ (@scope/pkg)  │  │ (https://…)   │
//! └───────┬───────┘  └───────┬───────┘  └───────┬───────┘
//!         │                  │                  │
//!   ┌─────▼─────┐      ┌─────▼─────┐      ┌─────▼─────┐
//!   │  Stdio    │      │  Stdio    │      │ HTTP/SSE  │
//!   │ Transport │      │ (npx -y)  │      │ Transport │
//!   └───────────┘      └───────────┘      └───────────┘
//! ```
//!
//! Each session owns exactly one transport; closing the session closes the
//! transport and terminates any child process behind it.
//!
//! # Example
//!
//! ```rust,ignore
//! use fanout::mcp::{McpSession, ServerConfig};
//!
//! let mut session = McpSession::connect(ServerConfig::from_target("weather.py")).await?;
//! let tools = session.list_tools().await?;
//! let result = session.call_tool("get_forecast", serde_json::json!({"city": "Oslo"})).await?;
//! println!("{}", result.as_text());
//! session.close().await?;
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod target;
pub mod transport;
pub mod types;

pub use config::{ServerConfig, TransportType};
pub use error::McpError;
pub use session::McpSession;
pub use target::TransportTarget;
pub use transport::Transport;
pub use types::*;
