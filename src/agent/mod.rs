// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation loop: the tool-use cycle for one session.
//!
//! The loop sends the user message to the model together with the session's
//! tool catalog, executes each tool the model requests, feeds the result back
//! through a follow-up model call, and collects the text into an answer.
//! Follow-ups are processed depth-first: everything a follow-up produces is
//! handled before the next block of the response that triggered it.
//!
//! # Example
//!
//! ```rust,ignore
//! use fanout::agent::{ConversationLoop, LoopConfig};
//! use fanout::mcp::{McpSession, ServerConfig};
//!
//! let provider = fanout::providers::create_provider_from_env()?;
//! let mut session = McpSession::connect(ServerConfig::from_target("weather.py")).await?;
//!
//! let conversation = ConversationLoop::new(provider, LoopConfig::default());
//! let turn = conversation.run(&mut session, &[], "Will it rain in Oslo?").await?;
//! println!("{}", turn.answer);
//! ```

mod types;

pub use types::{LoopConfig, Turn, TurnStats, TurnToolCall, DEFAULT_MAX_TOOL_DEPTH};

use std::time::Instant;

use tracing::{debug, warn};

use crate::error::AgentError;
use crate::mcp::{McpSession, ToolDescriptor};
use crate::types::{ContentBlock, Message, ProviderResponse, SharedProvider, ToolDefinition};

/// Drives the model / tool cycle for one session.
///
/// The loop holds no per-conversation state, so one instance can serve
/// several sessions concurrently.
pub struct ConversationLoop {
    provider: SharedProvider,
    config: LoopConfig,
}

impl ConversationLoop {
    /// Create a new loop over the given provider.
    pub fn new(provider: SharedProvider, config: LoopConfig) -> Self {
        Self { provider, config }
    }

    /// Shared provider handle.
    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    /// Loop configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run one turn on a copy of `history`.
    ///
    /// On error the input history is untouched; the partial working copy is
    /// discarded.
    pub async fn run(&self, session: &mut McpSession, history: &[Message], query: &str) -> Result<Turn, AgentError> {
        let mut working = history.to_vec();
        let (answer, stats) = self.run_in(session, &mut working, query).await?;
        Ok(Turn {
            answer,
            history: working,
            stats,
        })
    }

    /// Run one turn, appending to `history` in place.
    ///
    /// If a tool call or model call fails, `history` keeps whatever was
    /// appended before the failure.
    pub async fn run_in(
        &self,
        session: &mut McpSession,
        history: &mut Vec<Message>,
        query: &str,
    ) -> Result<(String, TurnStats), AgentError> {
        let start = Instant::now();
        let mut stats = TurnStats::default();
        let mut answer: Vec<String> = Vec::new();

        history.push(Message::user(query));

        let tools: Vec<ToolDefinition> = session
            .list_tools()
            .await?
            .iter()
            .map(ToolDescriptor::to_definition)
            .collect();
        let declared = (!tools.is_empty() && self.provider.supports_tool_use()).then_some(tools.as_slice());

        let response = self.call_model(history, declared, &mut stats).await?;

        // One iterator per pending response; stack depth is the follow-up depth + 1.
        let mut pending = vec![response.content.into_iter()];

        while let Some(blocks) = pending.last_mut() {
            let Some(block) = blocks.next() else {
                pending.pop();
                continue;
            };
            let depth = pending.len() - 1;

            match block {
                ContentBlock::Text { text } => {
                    if text.is_empty() {
                        continue;
                    }
                    answer.push(text.clone());
                    history.push(Message::assistant(text));
                }
                ContentBlock::ToolUse { id, name, input } => {
                    if depth >= self.config.max_tool_depth {
                        warn!(
                            server = session.label(),
                            tool = %name,
                            depth,
                            "Tool depth limit reached, skipping tool call"
                        );
                        answer.push(format!(
                            "[Skipped tool {}: tool depth limit of {} reached]",
                            name, self.config.max_tool_depth
                        ));
                        continue;
                    }

                    history.push(Message::tool_use(&id, &name, input.clone()));

                    debug!(server = session.label(), tool = %name, depth, "Calling tool");
                    let call_start = Instant::now();
                    let result = session.call_tool(&name, input.clone()).await?;

                    stats.tool_call_count += 1;
                    stats.tool_calls.push(TurnToolCall {
                        name: name.clone(),
                        duration_ms: call_start.elapsed().as_millis() as u64,
                        is_error: result.is_error,
                    });

                    history.push(Message::tool_result(&id, result.as_text(), result.is_error));

                    if self.config.annotate_tool_calls {
                        answer.push(annotation(&name, &input));
                    }

                    let follow_up = self.call_model(history, declared, &mut stats).await?;
                    pending.push(follow_up.content.into_iter());
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    debug!(%tool_use_id, "Ignoring tool_result block in model output");
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok((answer.join("\n"), stats))
    }

    async fn call_model(
        &self,
        history: &[Message],
        tools: Option<&[ToolDefinition]>,
        stats: &mut TurnStats,
    ) -> Result<ProviderResponse, AgentError> {
        debug!(
            messages = history.len(),
            tools = tools.map(<[_]>::len).unwrap_or(0),
            "Calling model"
        );
        let response = self
            .provider
            .chat(history, tools, self.config.system_prompt.as_deref())
            .await?;

        stats.model_calls += 1;
        if let Some(ref usage) = response.usage {
            stats.input_tokens += usage.input_tokens as u64;
            stats.output_tokens += usage.output_tokens as u64;
            stats.total_tokens += usage.total() as u64;
        }
        Ok(response)
    }
}

/// Answer line recording a tool invocation.
fn annotation(name: &str, input: &serde_json::Value) -> String {
    format!("[Calling tool {} with args {}]", name, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_annotation_format() {
        assert_eq!(
            annotation("get_forecast", &json!({"city": "Oslo"})),
            r#"[Calling tool get_forecast with args {"city":"Oslo"}]"#
        );
        assert_eq!(annotation("ping", &json!({})), "[Calling tool ping with args {}]");
    }

    #[test]
    fn test_loop_config_defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.max_tool_depth, DEFAULT_MAX_TOOL_DEPTH);
        assert!(config.annotate_tool_calls);
        assert!(config.system_prompt.is_none());

        let config = LoopConfig::default().with_max_tool_depth(1).with_system_prompt("Be brief.");
        assert_eq!(config.max_tool_depth, 1);
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
    }
}
