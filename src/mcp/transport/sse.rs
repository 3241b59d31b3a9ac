// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server-Sent Events: an incremental parser and the legacy HTTP+SSE
//! transport (GET event stream for server messages, POST endpoint for
//! client messages).

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{unbatch, Transport};
use crate::mcp::config::TransportType;
use crate::mcp::error::McpError;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Line-oriented SSE parser that tolerates chunks split anywhere,
/// including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Legacy HTTP+SSE transport.
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: Url,
    bearer: Option<String>,
    inbox: mpsc::Receiver<Result<Value, McpError>>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its POST endpoint.
    pub async fn connect(url: &str, bearer: Option<String>) -> Result<Self, McpError> {
        let base = Url::parse(url).map_err(|e| McpError::config(format!("invalid URL '{}': {}", url, e)))?;
        let client = reqwest::Client::new();

        let mut request = client.get(base.clone()).header(ACCEPT, "text/event-stream");
        if let Some(token) = &bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(McpError::transport(format!("HTTP {} opening event stream at {}", status, url)));
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let (tx, inbox) = mpsc::channel(64);
        let reader = tokio::spawn(read_events(response, endpoint_tx, tx));

        let endpoint = match endpoint_rx.await {
            Ok(path) => base
                .join(&path)
                .map_err(|e| McpError::protocol(format!("invalid endpoint '{}': {}", path, e)))?,
            Err(_) => {
                reader.abort();
                return Err(McpError::transport("event stream closed before endpoint event"));
            }
        };
        debug!(%endpoint, "SSE endpoint announced");

        Ok(Self {
            client,
            endpoint,
            bearer,
            inbox,
            reader,
        })
    }
}

async fn read_events(
    mut response: reqwest::Response,
    endpoint_tx: oneshot::Sender<String>,
    tx: mpsc::Sender<Result<Value, McpError>>,
) {
    let mut parser = SseParser::new();
    let mut endpoint_tx = Some(endpoint_tx);

    loop {
        let (events, done) = match response.chunk().await {
            Ok(Some(chunk)) => (parser.feed(&chunk), false),
            Ok(None) => (parser.finish().into_iter().collect::<Vec<_>>(), true),
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };

        for event in events {
            match event.event.as_str() {
                "endpoint" => {
                    if let Some(sender) = endpoint_tx.take() {
                        let _ = sender.send(event.data.trim().to_string());
                    }
                }
                "message" => match serde_json::from_str::<Value>(&event.data) {
                    Ok(value) => {
                        for message in unbatch(value) {
                            if tx.send(Ok(message)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Skipping malformed SSE message"),
                },
                other => debug!(event = other, "Ignoring SSE event"),
            }
        }

        if done {
            return;
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, message: &Value) -> Result<(), McpError> {
        let mut request = self.client.post(self.endpoint.clone()).json(message);
        if let Some(token) = &self.bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::transport(format!("HTTP {} from {}: {}", status, self.endpoint, body)));
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Value>, McpError> {
        match self.inbox.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.reader.abort();
        self.inbox.close();
        Ok(())
    }

    fn kind(&self) -> TransportType {
        TransportType::Sse
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
