// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory tool servers and a scripted model for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use fanout::error::ProviderError;
use fanout::mcp::{McpError, McpSession, ServerConfig, Transport, TransportType};
use fanout::types::{Message, Provider, ProviderResponse, ToolDefinition};

// ============================================================================
// Fake tool server
// ============================================================================

type ToolHandler = Arc<dyn Fn(&str, &Value) -> Result<Value, String> + Send + Sync>;

/// What a fake server saw.
#[derive(Debug, Default)]
pub struct ServerLog {
    pub calls: Vec<(String, Value)>,
    pub closed: bool,
}

/// A tool server living inside the test process.
///
/// Answers `initialize`, `tools/list`, and `tools/call`; tool calls go
/// through the handler. `Err` from the handler becomes a JSON-RPC error.
pub struct FakeServer {
    tools: Vec<Value>,
    handler: ToolHandler,
    call_delay: Option<Duration>,
    queue: VecDeque<(Option<Duration>, Value)>,
    log: Arc<Mutex<ServerLog>>,
}

impl FakeServer {
    /// Server exposing `(name, description)` tools; every call echoes its arguments.
    pub fn new(tools: &[(&str, &str)]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|(name, description)| {
                    json!({
                        "name": name,
                        "description": description,
                        "inputSchema": {"type": "object"}
                    })
                })
                .collect(),
            handler: Arc::new(|name, args| Ok(text_result(format!("{} {}", name, args)))),
            call_delay: None,
            queue: VecDeque::new(),
            log: Arc::new(Mutex::new(ServerLog::default())),
        }
    }

    /// Server exposing `tools` exactly as given in `tools/list` wire form.
    pub fn with_tools(tools: Vec<Value>) -> Self {
        Self {
            tools,
            ..Self::new(&[])
        }
    }

    pub fn on_call(mut self, handler: impl Fn(&str, &Value) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Hold every tool result back for `delay`.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn log(&self) -> Arc<Mutex<ServerLog>> {
        self.log.clone()
    }

    /// Wrap in a session and run the handshake.
    pub async fn session(self, label: &str) -> McpSession {
        let config = ServerConfig::from_target(format!("{}.py", label)).with_name(label);
        let mut session = McpSession::new(config, Box::new(self));
        session.initialize().await.unwrap();
        session
    }

    fn reply(&mut self, request: &Value) {
        let id = request["id"].clone();
        let (delay, outcome) = match request["method"].as_str() {
            Some("initialize") => (
                None,
                Ok(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake", "version": "0.0.1"}
                })),
            ),
            Some("tools/list") => (None, Ok(json!({ "tools": self.tools }))),
            Some("tools/call") => {
                let name = request["params"]["name"].as_str().unwrap_or_default().to_string();
                let args = request["params"]["arguments"].clone();
                self.log.lock().unwrap().calls.push((name.clone(), args.clone()));
                (self.call_delay, (self.handler)(&name, &args))
            }
            _ => return,
        };

        let message = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(message) => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32000, "message": message}}),
        };
        self.queue.push_back((delay, message));
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&mut self, message: &Value) -> Result<(), McpError> {
        if message.get("id").is_some() && message.get("method").is_some() {
            self.reply(message);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Value>, McpError> {
        match self.queue.pop_front() {
            Some((delay, message)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }

    fn kind(&self) -> TransportType {
        TransportType::Stdio
    }
}

/// `tools/call` result carrying one text item.
pub fn text_result(text: impl Into<String>) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}]})
}

/// `tools/call` result flagged as a tool-level failure.
pub fn error_result(text: impl Into<String>) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}], "isError": true})
}

// ============================================================================
// Fake model
// ============================================================================

type Responder = Box<dyn Fn(&[Message], Option<&[ToolDefinition]>) -> Result<ProviderResponse, ProviderError> + Send + Sync>;

/// One recorded `chat` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub system_prompt: Option<String>,
}

/// Model stand-in driven by a closure over the request.
pub struct FakeProvider {
    respond: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeProvider {
    pub fn new(
        respond: impl Fn(&[Message], Option<&[ToolDefinition]>) -> Result<ProviderResponse, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Hand out `responses` in order, then plain "done".
    pub fn scripted(responses: Vec<ProviderResponse>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_, _| {
            Ok(queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ProviderResponse::text("done")))
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.map(<[ToolDefinition]>::to_vec),
            system_prompt: system_prompt.map(str::to_string),
        });
        (self.respond)(messages, tools)
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}
