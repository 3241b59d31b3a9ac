// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use super::types::{ResolvedConfig, ServerEntry, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_tool_depth: Option<usize>,
    /// Positional server targets; replace configured servers when non-empty.
    pub servers: Vec<String>,
    pub trip_bind: Option<String>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.fanout.local.json)
/// 3. Workspace config (.fanout.json)
/// 4. Global config (~/.fanout/config.json)
/// 5. Default values
///
/// Scalars are overridden key by key; a `servers` list replaces the list
/// from lower layers as a whole.
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, config);
    }

    apply_cli_options(&mut result, cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: WorkspaceConfig) {
    if let Some(model) = config.model {
        result.model = model;
    }

    if config.base_url.is_some() {
        result.base_url = config.base_url;
    }

    if let Some(max_tokens) = config.max_tokens {
        result.max_tokens = max_tokens;
    }

    if config.temperature.is_some() {
        result.temperature = config.temperature;
    }

    if config.system_prompt.is_some() {
        result.system_prompt = config.system_prompt;
    }

    if let Some(servers) = config.servers {
        result.servers = servers.into_iter().map(ServerEntry::into_config).collect();
    }

    if let Some(depth) = config.max_tool_depth {
        result.max_tool_depth = depth;
    }

    if let Some(secs) = config.branch_timeout_sec {
        result.branch_timeout_sec = secs;
    }

    if let Some(single) = config.synthesize_single {
        result.synthesize_single = single;
    }

    if let Some(ref trip) = config.trip {
        trip.apply(&mut result.trip);
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: CliOptions) {
    if let Some(model) = cli.model {
        result.model = model;
    }

    if cli.base_url.is_some() {
        result.base_url = cli.base_url;
    }

    if let Some(max_tokens) = cli.max_tokens {
        result.max_tokens = max_tokens;
    }

    if let Some(depth) = cli.max_tool_depth {
        result.max_tool_depth = depth;
    }

    if !cli.servers.is_empty() {
        result.servers = cli
            .servers
            .into_iter()
            .map(crate::mcp::ServerConfig::from_target)
            .collect();
    }

    if let Some(bind) = cli.trip_bind {
        result.trip.bind = bind;
    }
}
