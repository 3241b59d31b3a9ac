// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streamable HTTP transport.
//!
//! Every client message is a POST. Replies come back in the POST response,
//! either as a JSON body or as an SSE body, and are queued until
//! [`Transport::receive`] drains them.

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use super::sse::SseParser;
use super::{unbatch, Transport};
use crate::mcp::config::TransportType;
use crate::mcp::error::McpError;

/// Session header assigned by the server during initialization.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Transport that POSTs each message to one URL.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
    session_id: Option<String>,
    inbox: VecDeque<Value>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, bearer: Option<String>) -> Result<Self, McpError> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| McpError::config(format!("invalid URL '{}': {}", url, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            bearer,
            session_id: None,
            inbox: VecDeque::new(),
        })
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }
        request
    }

    fn enqueue(&mut self, value: Value) {
        self.inbox.extend(unbatch(value));
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, message: &Value) -> Result<(), McpError> {
        let request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        let response = self.authorize(request).send().await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(id.to_string());
        }

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::transport(format!("HTTP {} from {}: {}", status, self.url, body)));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.bytes().await?;

        if is_event_stream {
            let mut parser = SseParser::new();
            let mut events = parser.feed(&body);
            events.extend(parser.finish());
            for event in events.into_iter().filter(|e| e.event == "message") {
                match serde_json::from_str(&event.data) {
                    Ok(value) => self.enqueue(value),
                    Err(e) => warn!(error = %e, "Skipping malformed SSE message"),
                }
            }
        } else if !body.iter().all(u8::is_ascii_whitespace) {
            let value: Value = serde_json::from_slice(&body)?;
            self.enqueue(value);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Value>, McpError> {
        Ok(self.inbox.pop_front())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.inbox.clear();
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };

        let mut request = self.client.delete(&self.url).header(SESSION_HEADER, &id);
        if let Some(token) = &self.bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        match request.send().await {
            Ok(response) => debug!(status = %response.status(), "Ended HTTP session"),
            Err(e) => debug!(error = %e, "Session DELETE failed"),
        }
        Ok(())
    }

    fn kind(&self) -> TransportType {
        TransportType::Http
    }
}
