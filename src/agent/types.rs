// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation loop types and configuration.

use crate::types::Message;

/// Follow-up model calls allowed below one user turn.
pub const DEFAULT_MAX_TOOL_DEPTH: usize = 8;

/// Statistics for a single turn (user message -> final answer).
#[derive(Debug, Clone, Default)]
pub struct TurnStats {
    /// Number of tool calls executed.
    pub tool_call_count: usize,
    /// Number of model calls made.
    pub model_calls: usize,
    /// Input tokens used.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Total tokens (input + output).
    pub total_tokens: u64,
    /// Duration of the turn in milliseconds.
    pub duration_ms: u64,
    /// Individual tool call stats.
    pub tool_calls: Vec<TurnToolCall>,
}

/// Statistics for a single tool call.
#[derive(Debug, Clone)]
pub struct TurnToolCall {
    /// Tool name.
    pub name: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the server flagged the result as an error.
    pub is_error: bool,
}

/// Configuration for the conversation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum nesting of follow-up model calls.
    pub max_tool_depth: usize,
    /// System prompt sent with every model call.
    pub system_prompt: Option<String>,
    /// Add `[Calling tool ...]` lines to the answer.
    pub annotate_tool_calls: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            system_prompt: None,
            annotate_tool_calls: true,
        }
    }
}

impl LoopConfig {
    /// Set the maximum tool depth.
    pub fn with_max_tool_depth(mut self, depth: usize) -> Self {
        self.max_tool_depth = depth;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Rendered answer: text and annotations joined by newlines.
    pub answer: String,
    /// Updated history; a strict extension of the input history.
    pub history: Vec<Message>,
    /// Turn statistics.
    pub stats: TurnStats,
}
