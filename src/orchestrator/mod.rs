// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Multi-server fan-out.
//!
//! The orchestrator owns one slot per connected tool server. A query runs
//! every slot's conversation concurrently, each against its own history, and
//! a final model call merges the per-server answers into one.
//!
//! ```text
//!                       query
//!                         │
//!        ┌────────────────┼────────────────┐
//!        ▼                ▼                ▼
//!   ┌─────────┐      ┌─────────┐      ┌─────────┐
//!   │ slot #0 │      │ slot #1 │      │ slot #2 │   ConversationLoop
//!   │ history │      │ history │      │ history │   per slot
//!   └────┬────┘      └────┬────┘      └────┬────┘
//!        └────────────────┼────────────────┘
//!                         ▼
//!                  synthesis call
//!                         │
//!                         ▼
//!                   final answer
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, info_span, warn, Instrument};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::agent::{ConversationLoop, LoopConfig};
use crate::error::AgentError;
use crate::mcp::{McpError, McpSession, ServerConfig, SessionState};
use crate::telemetry::CorrelationId;
use crate::types::{Message, SharedProvider};

/// Default time budget for one branch of a query.
pub const DEFAULT_BRANCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Header of the synthesis prompt.
const SYNTHESIS_HEADER: &str = "Combine the following responses into a final, coherent answer:\n";

/// Stable identifier of a slot, assigned at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub usize);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-branch time budget; `None` waits indefinitely.
    pub branch_timeout: Option<Duration>,
    /// Run the synthesis call even with a single session. When off, the
    /// lone branch's answer (or its error text) is returned as is.
    pub synthesize_single: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            branch_timeout: Some(DEFAULT_BRANCH_TIMEOUT),
            synthesize_single: true,
        }
    }
}

struct Slot {
    id: SessionId,
    label: String,
    session: McpSession,
    history: Vec<Message>,
}

/// Fans queries out to every connected session and merges the answers.
pub struct Orchestrator {
    conversation: ConversationLoop,
    config: OrchestratorConfig,
    slots: Vec<Slot>,
    next_id: usize,
}

impl Orchestrator {
    /// Create an orchestrator with no sessions.
    pub fn new(provider: SharedProvider, loop_config: LoopConfig, config: OrchestratorConfig) -> Self {
        Self {
            conversation: ConversationLoop::new(provider, loop_config),
            config,
            slots: Vec::new(),
            next_id: 0,
        }
    }

    /// Register an already-initialized session.
    pub fn add_session(&mut self, label: impl Into<String>, session: McpSession) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            label: label.into(),
            session,
            history: Vec::new(),
        });
        id
    }

    /// Connect every enabled server concurrently.
    ///
    /// Ids follow the position in `servers`. Returns the servers that could
    /// not be connected; those are skipped and their ids left unused.
    pub async fn connect_all(&mut self, servers: &[ServerConfig]) -> Vec<(String, McpError)> {
        let base = self.next_id;
        self.next_id += servers.len();

        let attempts = servers.iter().enumerate().filter(|(_, c)| c.enabled).map(|(i, config)| {
            let config = config.clone();
            async move { (i, config.label(), McpSession::connect(config).await) }
        });

        let mut failures = Vec::new();
        for (i, label, result) in join_all(attempts).await {
            match result {
                Ok(session) => {
                    info!(server = %label, id = base + i, tools = session.cached_tools().len(), "Connected");
                    self.slots.push(Slot {
                        id: SessionId(base + i),
                        label,
                        session,
                        history: Vec::new(),
                    });
                }
                Err(e) => {
                    warn!(server = %label, error = %e, "Failed to connect");
                    failures.push((label, e));
                }
            }
        }
        failures
    }

    /// Run `text` on every session and return the merged answer.
    pub async fn query(&mut self, text: &str) -> Result<String, AgentError> {
        if self.slots.is_empty() {
            return Err(AgentError::NoSessions);
        }

        let correlation = CorrelationId::new();
        let start = Instant::now();
        info!(correlation = %correlation, sessions = self.slots.len(), "Dispatching query");

        let conversation = &self.conversation;
        let branch_timeout = self.config.branch_timeout;

        let branches = self.slots.iter_mut().map(|slot| {
            let span = info_span!("branch", correlation = %correlation, server = %slot.label, id = slot.id.0);
            async move {
                let turn = conversation.run(&mut slot.session, &slot.history, text);
                match branch_timeout {
                    Some(limit) => tokio::time::timeout(limit, turn).await.unwrap_or_else(|_| {
                        Err(McpError::transport(format!("no answer within {}s", limit.as_secs())).into())
                    }),
                    None => turn.await,
                }
            }
            .instrument(span)
        });
        let outcomes = join_all(branches).await;

        let mut answers: Vec<(String, Result<String, AgentError>)> = Vec::with_capacity(outcomes.len());
        for (slot, outcome) in self.slots.iter_mut().zip(outcomes) {
            match outcome {
                Ok(turn) => {
                    debug!(
                        server = %slot.label,
                        tool_calls = turn.stats.tool_call_count,
                        tokens = turn.stats.total_tokens,
                        duration_ms = turn.stats.duration_ms,
                        "Branch finished"
                    );
                    slot.history = turn.history;
                    answers.push((slot.label.clone(), Ok(turn.answer)));
                }
                Err(e) => {
                    warn!(correlation = %correlation, server = %slot.label, error = %e, "Branch failed");
                    answers.push((slot.label.clone(), Err(e)));
                }
            }
        }

        let result = if answers.len() == 1 && !self.config.synthesize_single {
            Ok(answers.pop().map(|(_, answer)| branch_text(&answer)).unwrap_or_default())
        } else {
            self.synthesize(&answers).await
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("orchestrator.query", start.elapsed());
        info!(correlation = %correlation, elapsed_ms = start.elapsed().as_millis() as u64, "Query complete");

        result
    }

    async fn synthesize(&self, answers: &[(String, Result<String, AgentError>)]) -> Result<String, AgentError> {
        let prompt = synthesis_prompt(answers);
        let response = self
            .conversation
            .provider()
            .chat(&[Message::user(prompt)], None, None)
            .await?;
        Ok(response.text_content())
    }

    /// Clear every history; sessions stay connected.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.history.clear();
        }
        info!("Conversation histories cleared");
    }

    /// Close every session.
    ///
    /// Failures are logged and returned; they never stop the remaining closes.
    pub async fn shutdown(&mut self) -> Vec<(String, McpError)> {
        let closes = self.slots.iter_mut().map(|slot| async move {
            let result = slot.session.close().await;
            (slot.label.clone(), result)
        });

        join_all(closes)
            .await
            .into_iter()
            .filter_map(|(label, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!(server = %label, error = %e, "Failed to close session");
                    Some((label, e))
                }
            })
            .collect()
    }

    /// Ids of all slots, in order.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.slots.iter().map(|s| s.id).collect()
    }

    /// Labels of all slots, in order.
    pub fn labels(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.label.as_str()).collect()
    }

    /// History of one slot.
    pub fn history(&self, id: SessionId) -> Option<&[Message]> {
        self.slot(id).map(|s| s.history.as_slice())
    }

    /// Lifecycle state of one slot's session.
    pub fn session_state(&self, id: SessionId) -> Option<SessionState> {
        self.slot(id).map(|s| s.session.state())
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no session is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, id: SessionId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }
}

/// Build the synthesis prompt; failed branches contribute their error.
fn synthesis_prompt(answers: &[(String, Result<String, AgentError>)]) -> String {
    let mut prompt = String::from(SYNTHESIS_HEADER);
    for (n, (label, answer)) in answers.iter().enumerate() {
        prompt.push_str(&format!(
            "Response from server {} ({}):\n{}\n\n",
            n + 1,
            label,
            branch_text(answer)
        ));
    }
    prompt
}

/// A branch's answer, or its error as text.
fn branch_text(answer: &Result<String, AgentError>) -> String {
    match answer {
        Ok(text) => text.clone(),
        Err(e) => format!("Error: {}", e),
    }
}
