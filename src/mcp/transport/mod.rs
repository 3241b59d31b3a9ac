// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Message channels to tool servers.
//!
//! A [`Transport`] moves whole JSON-RPC messages; framing (newline-delimited
//! JSON, HTTP bodies, SSE events) is the transport's business. Every
//! transport owns its resources: dropping one releases them, and
//! [`Transport::close`] releases them deliberately.

mod http;
mod sse;
mod stdio;

pub use http::HttpTransport;
pub use sse::{SseEvent, SseParser, SseTransport};
pub use stdio::StdioTransport;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::config::{ServerConfig, TransportType};
use super::error::McpError;
use super::target::TransportTarget;

/// A duplex JSON-RPC message channel.
#[async_trait]
pub trait Transport: Send {
    /// Write one message.
    async fn send(&mut self, message: &Value) -> Result<(), McpError>;

    /// Read the next message; `None` once the channel has closed.
    async fn receive(&mut self) -> Result<Option<Value>, McpError>;

    /// Release the channel and any process behind it.
    async fn close(&mut self) -> Result<(), McpError>;

    /// Transport kind.
    fn kind(&self) -> TransportType;
}

/// Resolve a server entry and open the matching transport.
pub async fn open(config: &ServerConfig) -> Result<Box<dyn Transport>, McpError> {
    let target = config.resolve()?;
    debug!(server = %config.label(), target = %target, "Opening transport");

    let bearer = config.expanded_bearer_token();
    let transport: Box<dyn Transport> = match target {
        TransportTarget::Process { program, args } => {
            Box::new(StdioTransport::spawn(&program, &args, config)?)
        }
        TransportTarget::StreamableHttp { url } => Box::new(HttpTransport::new(url, bearer)?),
        TransportTarget::Sse { url } => Box::new(SseTransport::connect(&url, bearer).await?),
    };
    Ok(transport)
}

/// Split a decoded body into individual messages (JSON-RPC batches are arrays).
pub(crate) fn unbatch(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}
