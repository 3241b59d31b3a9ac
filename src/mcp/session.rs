// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A live, initialized connection to one tool server.
//!
//! ```text
//! uninitialized --initialize()--> ready --close()--> closed
//! ```
//!
//! Everything except `initialize()` and `close()` requires `ready`.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "telemetry")]
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use super::error::McpError;
use super::protocol::{self, Incoming, RpcError, METHOD_NOT_FOUND, PROTOCOL_VERSION};
use super::transport::{self, Transport};
use super::types::{InitializeResult, ListToolsPage, ServerInfo, SessionState, ToolCallResult, ToolDescriptor};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Upper bound on `tools/list` pages, in case a server keeps handing out cursors.
const MAX_TOOL_PAGES: usize = 64;

/// Outcome of one request.
enum Reply {
    Result(Value),
    Rpc(RpcError),
    Closed,
}

/// Session over one transport.
pub struct McpSession {
    label: String,
    config: ServerConfig,
    transport: Box<dyn Transport>,
    state: SessionState,
    next_id: u64,
    server: Option<InitializeResult>,
    tools: Vec<ToolDescriptor>,
}

impl McpSession {
    /// Wrap an already-open transport. The session starts uninitialized.
    pub fn new(config: ServerConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            label: config.label(),
            config,
            transport,
            state: SessionState::Uninitialized,
            next_id: 0,
            server: None,
            tools: Vec::new(),
        }
    }

    /// Open the transport, initialize, and fetch the first tool listing.
    ///
    /// The whole sequence is bounded by the startup timeout. On failure the
    /// transport is closed (or dropped, on timeout) before the error is
    /// returned.
    pub async fn connect(config: ServerConfig) -> Result<Self, McpError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let limit = config.startup_timeout();
        let label = config.label();
        let session = bounded(limit, Self::open_and_handshake(config), || {
            McpError::transport(format!(
                "'{}' did not finish connecting within {}s",
                label,
                limit.map(|d| d.as_secs()).unwrap_or_default()
            ))
        })
        .await?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.connect", start.elapsed());

        Ok(session)
    }

    async fn open_and_handshake(config: ServerConfig) -> Result<Self, McpError> {
        let transport = transport::open(&config).await?;
        let mut session = Self::new(config, transport);

        if let Err(e) = session.handshake().await {
            if let Err(close_err) = session.close().await {
                debug!(server = %session.label, error = %close_err, "Close after failed handshake also failed");
            }
            return Err(e);
        }
        Ok(session)
    }

    async fn handshake(&mut self) -> Result<(), McpError> {
        self.initialize().await?;
        let tools = self.list_tools().await?;
        info!(
            server = %self.label,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Connected to tool server"
        );
        Ok(())
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref().and_then(|s| s.server_info.as_ref())
    }

    /// Catalog from the most recent `list_tools` call.
    pub fn cached_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Perform the protocol handshake.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, McpError> {
        if self.state != SessionState::Uninitialized {
            return Err(McpError::state("initialize", self.state));
        }

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": crate::VERSION,
            },
        });

        let limit = self.config.startup_timeout();
        let label = self.label.clone();
        let reply = bounded(limit, self.request("initialize", Some(params)), || {
            McpError::transport(format!("'{}' did not answer initialize in time", label))
        })
        .await?;

        let result = match reply {
            Reply::Result(value) => value,
            Reply::Rpc(e) => return Err(McpError::protocol(format!("initialize rejected: {}", e))),
            Reply::Closed => return Err(McpError::protocol("stream closed before initialize response")),
        };
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("malformed initialize result: {}", e)))?;

        self.transport
            .send(&protocol::notification("notifications/initialized"))
            .await?;

        debug!(
            server = %self.label,
            protocol = %init.protocol_version,
            name = ?init.server_info.as_ref().map(|s| s.name.as_str()),
            "Handshake complete"
        );
        self.state = SessionState::Ready;
        Ok(&*self.server.insert(init))
    }

    /// Fetch the tool catalog, following pagination. Always re-fetches.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_ready("list tools")?;

        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let page = match self.request("tools/list", params).await? {
                Reply::Result(value) => value,
                Reply::Rpc(e) => return Err(McpError::protocol(format!("tools/list failed: {}", e))),
                Reply::Closed => return Err(McpError::protocol("stream closed during tools/list")),
            };
            let page: ListToolsPage = serde_json::from_value(page)
                .map_err(|e| McpError::protocol(format!("malformed tools/list result: {}", e)))?;

            for tool in page.tools {
                let descriptor = ToolDescriptor::from(tool);
                if !self.config.is_tool_enabled(&descriptor.name) {
                    continue;
                }
                if !seen.insert(descriptor.name.clone()) {
                    warn!(server = %self.label, tool = %descriptor.name, "Duplicate tool name, keeping the first");
                    continue;
                }
                tools.push(descriptor);
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    self.tools = tools.clone();
                    return Ok(tools);
                }
            }
        }

        Err(McpError::protocol(format!(
            "tools/list did not finish within {} pages",
            MAX_TOOL_PAGES
        )))
    }

    /// Invoke a tool. Unknown names are left for the server to reject.
    ///
    /// A result flagged `isError` is returned as `Ok`; protocol errors,
    /// stream loss, and timeouts become [`McpError::ToolInvocation`].
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        self.ensure_ready("call tools")?;

        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        let params = json!({ "name": name, "arguments": arguments });

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let limit = self.config.tool_timeout();
        debug!(server = %self.label, tool = name, "Calling tool");
        let reply = bounded(limit, self.request("tools/call", Some(params)), || {
            McpError::transport(format!(
                "no result within {}s",
                limit.map(|d| d.as_secs()).unwrap_or_default()
            ))
        })
        .await;

        let outcome = match reply {
            Ok(Reply::Result(value)) => serde_json::from_value::<ToolCallResult>(value)
                .map_err(|e| McpError::tool_failed(name, format!("malformed result: {}", e))),
            Ok(Reply::Rpc(e)) => Err(McpError::tool_failed(name, e.to_string())),
            Ok(Reply::Closed) => Err(McpError::tool_failed(name, "stream closed before the result arrived")),
            Err(e) => Err(McpError::tool_failed(name, e.to_string())),
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_tool(
            &format!("{}.{}", self.label, name),
            start.elapsed(),
            !matches!(&outcome, Ok(result) if !result.is_error),
        );

        outcome
    }

    /// Close the session and its transport. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), McpError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        debug!(server = %self.label, "Closing session");
        self.transport.close().await
    }

    fn ensure_ready(&self, operation: &str) -> Result<(), McpError> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(McpError::state(operation, self.state))
        }
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Reply, McpError> {
        self.next_id += 1;
        let id = self.next_id;
        self.transport.send(&protocol::request(id, method, params)).await?;
        self.await_reply(id).await
    }

    /// Read until the response for `id` arrives, serving what comes in between.
    async fn await_reply(&mut self, id: u64) -> Result<Reply, McpError> {
        loop {
            let Some(message) = self.transport.receive().await? else {
                return Ok(Reply::Closed);
            };

            match Incoming::parse(message) {
                Ok(Incoming::Response { id: reply_id, outcome }) => {
                    if protocol::id_matches(&reply_id, id) {
                        return Ok(match outcome {
                            Ok(result) => Reply::Result(result),
                            Err(e) => Reply::Rpc(e),
                        });
                    }
                    debug!(server = %self.label, id = %reply_id, "Skipping response for another request");
                }
                Ok(Incoming::Request { id: request_id, method }) => {
                    let answer = if method == "ping" {
                        protocol::reply(request_id, json!({}))
                    } else {
                        protocol::error_reply(
                            request_id,
                            METHOD_NOT_FOUND,
                            &format!("method '{}' is not supported by this client", method),
                        )
                    };
                    self.transport.send(&answer).await?;
                }
                Ok(Incoming::Notification { method }) => {
                    debug!(server = %self.label, method = %method, "Server notification");
                }
                Err(e) => warn!(server = %self.label, error = %e, "Skipping malformed message"),
            }
        }
    }
}

async fn bounded<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, McpError>>,
    on_timeout: impl FnOnce() -> McpError,
) -> Result<T, McpError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(on_timeout())),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::TransportType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

    /// In-memory server: each sent message may produce replies.
    struct ScriptedTransport {
        respond: Responder,
        queue: VecDeque<Value>,
        sent: Arc<Mutex<Vec<Value>>>,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: &Value) -> Result<(), McpError> {
            self.sent.lock().unwrap().push(message.clone());
            let replies = (self.respond)(message);
            self.queue.extend(replies);
            Ok(())
        }

        async fn receive(&mut self) -> Result<Option<Value>, McpError> {
            Ok(self.queue.pop_front())
        }

        async fn close(&mut self) -> Result<(), McpError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }

        fn kind(&self) -> TransportType {
            TransportType::Stdio
        }
    }

    struct Harness {
        session: McpSession,
        sent: Arc<Mutex<Vec<Value>>>,
        closed: Arc<Mutex<bool>>,
    }

    fn harness(config: ServerConfig, respond: impl FnMut(&Value) -> Vec<Value> + Send + 'static) -> Harness {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let transport = ScriptedTransport {
            respond: Box::new(respond),
            queue: VecDeque::new(),
            sent: sent.clone(),
            closed: closed.clone(),
        };
        Harness {
            session: McpSession::new(config, Box::new(transport)),
            sent,
            closed,
        }
    }

    fn ok(request: &Value, result: Value) -> Vec<Value> {
        vec![json!({"jsonrpc": "2.0", "id": request["id"], "result": result})]
    }

    fn server(request: &Value) -> Vec<Value> {
        match request["method"].as_str() {
            Some("initialize") => ok(request, json!({"protocolVersion": "2024-11-05", "capabilities": {}, "serverInfo": {"name": "weather", "version": "1.0"}})),
            Some("tools/list") => ok(request, json!({"tools": [
                {"name": "get_forecast", "description": "Forecast", "inputSchema": {"type": "object"}},
                {"name": "get_alerts", "inputSchema": {"type": "object"}}
            ]})),
            Some("tools/call") => {
                let city = request["params"]["arguments"]["city"].as_str().unwrap_or("?").to_string();
                ok(request, json!({"content": [{"type": "text", "text": format!("rain in {}", city)}]}))
            }
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_operations_require_ready() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        assert!(matches!(h.session.list_tools().await, Err(McpError::State { .. })));
        assert!(matches!(
            h.session.call_tool("get_forecast", json!({})).await,
            Err(McpError::State { .. })
        ));
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_sends_handshake_and_notification() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        let init = h.session.initialize().await.unwrap();
        assert_eq!(init.protocol_version, "2024-11-05");
        assert_eq!(h.session.state(), SessionState::Ready);
        assert_eq!(h.session.server_info().unwrap().name, "weather");

        let sent = h.sent.lock().unwrap();
        assert_eq!(sent[0]["method"], "initialize");
        assert_eq!(sent[0]["params"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(sent[1]["method"], "notifications/initialized");
        assert!(sent[1].get("id").is_none());
    }

    #[tokio::test]
    async fn test_initialize_twice_is_state_error() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        h.session.initialize().await.unwrap();
        assert!(matches!(h.session.initialize().await, Err(McpError::State { .. })));
    }

    #[tokio::test]
    async fn test_initialize_without_reply_is_protocol_error() {
        let mut h = harness(ServerConfig::from_target("w.py"), |_| Vec::new());
        assert!(matches!(h.session.initialize().await, Err(McpError::Protocol(_))));
        assert_eq!(h.session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialize_malformed_result_is_protocol_error() {
        let mut h = harness(ServerConfig::from_target("w.py"), |req| ok(req, json!({"capabilities": {}})));
        assert!(matches!(h.session.initialize().await, Err(McpError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor_and_filters() {
        let config = ServerConfig::from_target("w.py").with_disabled_tools(["secret"]);
        let mut h = harness(config, |req| match req["method"].as_str() {
            Some("tools/list") if req["params"]["cursor"] == "p2" => ok(req, json!({"tools": [
                {"name": "b", "inputSchema": {}},
                {"name": "a", "inputSchema": {}}
            ]})),
            Some("tools/list") => ok(req, json!({"tools": [
                {"name": "a", "inputSchema": {"type": "object"}},
                {"name": "secret", "inputSchema": {}}
            ], "nextCursor": "p2"})),
            _ => server(req),
        });
        h.session.initialize().await.unwrap();

        let tools = h.session.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(tools[0].input_schema, json!({"type": "object"}));
        assert_eq!(h.session.cached_tools().len(), 2);
    }

    #[tokio::test]
    async fn test_list_tools_always_refetches() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        h.session.initialize().await.unwrap();
        h.session.list_tools().await.unwrap();
        h.session.list_tools().await.unwrap();
        let lists = h.sent.lock().unwrap().iter().filter(|m| m["method"] == "tools/list").count();
        assert_eq!(lists, 2);
    }

    #[tokio::test]
    async fn test_list_tools_malformed_is_protocol_error() {
        let mut h = harness(ServerConfig::from_target("w.py"), |req| match req["method"].as_str() {
            Some("tools/list") => ok(req, json!({"tools": "nope"})),
            _ => server(req),
        });
        h.session.initialize().await.unwrap();
        assert!(matches!(h.session.list_tools().await, Err(McpError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_call_tool_success_and_fresh_ids() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        h.session.initialize().await.unwrap();

        let first = h.session.call_tool("get_forecast", json!({"city": "Oslo"})).await.unwrap();
        let second = h.session.call_tool("get_forecast", json!({"city": "Rome"})).await.unwrap();
        assert_eq!(first.as_text(), "rain in Oslo");
        assert_eq!(second.as_text(), "rain in Rome");

        let sent = h.sent.lock().unwrap();
        let ids: Vec<_> = sent.iter().filter(|m| m["method"] == "tools/call").map(|m| m["id"].clone()).collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_call_tool_null_arguments_become_object() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        h.session.initialize().await.unwrap();
        h.session.call_tool("get_alerts", Value::Null).await.unwrap();
        let sent = h.sent.lock().unwrap();
        assert_eq!(sent.last().unwrap()["params"]["arguments"], json!({}));
    }

    #[tokio::test]
    async fn test_call_tool_rpc_error_is_tool_invocation_error() {
        let mut h = harness(ServerConfig::from_target("w.py"), |req| match req["method"].as_str() {
            Some("tools/call") => vec![json!({"jsonrpc": "2.0", "id": req["id"], "error": {"code": -32602, "message": "unknown tool"}})],
            _ => server(req),
        });
        h.session.initialize().await.unwrap();
        match h.session.call_tool("nope", json!({})).await {
            Err(McpError::ToolInvocation { tool, message }) => {
                assert_eq!(tool, "nope");
                assert!(message.contains("unknown tool"));
            }
            other => panic!("unexpected {:?}", other.map(|r| r.as_text())),
        }
    }

    #[tokio::test]
    async fn test_call_tool_stream_closed_mid_call() {
        let mut h = harness(ServerConfig::from_target("w.py"), |req| match req["method"].as_str() {
            Some("tools/call") => Vec::new(),
            _ => server(req),
        });
        h.session.initialize().await.unwrap();
        assert!(matches!(
            h.session.call_tool("get_forecast", json!({})).await,
            Err(McpError::ToolInvocation { .. })
        ));
    }

    #[tokio::test]
    async fn test_call_tool_is_error_result_is_not_an_error() {
        let mut h = harness(ServerConfig::from_target("w.py"), |req| match req["method"].as_str() {
            Some("tools/call") => ok(req, json!({"content": [{"type": "text", "text": "city not found"}], "isError": true})),
            _ => server(req),
        });
        h.session.initialize().await.unwrap();
        let result = h.session.call_tool("get_forecast", json!({"city": "Atlantis"})).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.as_text(), "city not found");
    }

    #[tokio::test]
    async fn test_server_ping_and_notifications_are_served() {
        let mut h = harness(ServerConfig::from_target("w.py"), |req| match req["method"].as_str() {
            Some("tools/call") => {
                let mut out = vec![
                    json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}}),
                    json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}),
                    json!({"jsonrpc": "2.0", "id": "srv-2", "method": "sampling/createMessage"}),
                    json!({"jsonrpc": "2.0", "id": 999, "result": {}}),
                ];
                out.extend(ok(req, json!({"content": [{"type": "text", "text": "ok"}]})));
                out
            }
            _ => server(req),
        });
        h.session.initialize().await.unwrap();
        let result = h.session.call_tool("get_forecast", json!({})).await.unwrap();
        assert_eq!(result.as_text(), "ok");

        let sent = h.sent.lock().unwrap();
        let ping_reply = sent.iter().find(|m| m["id"] == "srv-1").unwrap();
        assert_eq!(ping_reply["result"], json!({}));
        let refused = sent.iter().find(|m| m["id"] == "srv-2").unwrap();
        assert_eq!(refused["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_calls() {
        let mut h = harness(ServerConfig::from_target("w.py"), server);
        h.session.initialize().await.unwrap();
        h.session.close().await.unwrap();
        h.session.close().await.unwrap();
        assert!(*h.closed.lock().unwrap());
        assert_eq!(h.session.state(), SessionState::Closed);
        assert!(matches!(h.session.list_tools().await, Err(McpError::State { .. })));
        assert!(matches!(h.session.initialize().await, Err(McpError::State { .. })));
    }

    #[tokio::test]
    async fn test_call_tool_timeout() {
        struct Hanging;

        #[async_trait]
        impl Transport for Hanging {
            async fn send(&mut self, _message: &Value) -> Result<(), McpError> {
                Ok(())
            }
            async fn receive(&mut self) -> Result<Option<Value>, McpError> {
                std::future::pending().await
            }
            async fn close(&mut self) -> Result<(), McpError> {
                Ok(())
            }
            fn kind(&self) -> TransportType {
                TransportType::Stdio
            }
        }

        let config = ServerConfig::from_target("w.py").with_tool_timeout(1);
        let mut session = McpSession::new(config, Box::new(Hanging));
        session.state = SessionState::Ready;
        let result = session.call_tool("slow", json!({})).await;
        assert!(matches!(result, Err(McpError::ToolInvocation { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_is_bounded_by_startup_timeout() {
        // Answers initialize, then never answers tools/list.
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}'; sleep 30"#;
        let mut config = ServerConfig::command("sh", ["-c", script]);
        config.startup_timeout_sec = 1;

        let start = std::time::Instant::now();
        let result = McpSession::connect(config).await;

        assert!(matches!(result, Err(McpError::Transport(m)) if m.contains("did not finish connecting within 1s")));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
