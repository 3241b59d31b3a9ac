// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server target resolution.
//!
//! Resolution order:
//!
//! 1. `http://` / `https://` URLs are remote. A path ending in `/sse` selects
//!    the legacy SSE transport, anything else streamable HTTP.
//! 2. A first token with a known script extension runs under its runtime
//!    (`weather.py` → `python weather.py`).
//! 3. A scoped package, or a bare token without a path separator that looks
//!    like an npm package, runs through `npx -y`.
//! 4. Anything else is a configuration error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::config::TransportType;
use super::error::McpError;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").expect("valid url pattern"));

static NPM_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[A-Za-z0-9][A-Za-z0-9._~-]*/)?[A-Za-z0-9][A-Za-z0-9._~-]*(@[A-Za-z0-9._^~<>=*-]+)?$")
        .expect("valid package pattern")
});

/// Script extensions and the runtime that executes them.
const RUNTIMES: &[(&str, &str)] = &[("py", "python"), ("js", "node"), ("mjs", "node"), ("cjs", "node")];

/// Package runner for npm-style identifiers.
const PACKAGE_RUNNER: &str = "npx";

/// A resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    /// Spawn a child process and speak over its stdio.
    Process { program: String, args: Vec<String> },
    /// POST to a streamable HTTP endpoint.
    StreamableHttp { url: String },
    /// Legacy GET event stream plus POST endpoint.
    Sse { url: String },
}

impl TransportTarget {
    /// Resolve a target string.
    pub fn resolve(target: &str) -> Result<Self, McpError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(McpError::config("empty server target"));
        }

        if URL.is_match(target) {
            let path = target
                .split(['?', '#'])
                .next()
                .unwrap_or(target)
                .trim_end_matches('/');
            let url = target.to_string();
            return Ok(if path.ends_with("/sse") {
                Self::Sse { url }
            } else {
                Self::StreamableHttp { url }
            });
        }

        let mut tokens = target.split_whitespace().map(str::to_string);
        let Some(first) = tokens.next() else {
            return Err(McpError::config("empty server target"));
        };
        let rest: Vec<String> = tokens.collect();

        let extension = Path::new(&first)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if let Some(runtime) = extension
            .as_deref()
            .and_then(|ext| RUNTIMES.iter().find(|(known, _)| *known == ext))
            .map(|(_, runtime)| *runtime)
        {
            let mut args = vec![first];
            args.extend(rest);
            return Ok(Self::Process {
                program: runtime.to_string(),
                args,
            });
        }

        let has_separator = first.contains('/') || first.contains('\\');
        let scoped = first.starts_with('@');
        if (scoped || !has_separator) && NPM_PACKAGE.is_match(&first) {
            let mut args = vec!["-y".to_string(), first];
            args.extend(rest);
            return Ok(Self::Process {
                program: PACKAGE_RUNNER.to_string(),
                args,
            });
        }

        Err(McpError::config(format!(
            "server target '{}' must be a URL, a .py/.js script, or an npm package",
            target
        )))
    }

    /// Transport kind this target uses.
    pub fn kind(&self) -> TransportType {
        match self {
            Self::Process { .. } => TransportType::Stdio,
            Self::StreamableHttp { .. } => TransportType::Http,
            Self::Sse { .. } => TransportType::Sse,
        }
    }
}

impl std::fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process { program, args } if args.is_empty() => write!(f, "{}", program),
            Self::Process { program, args } => write!(f, "{} {}", program, args.join(" ")),
            Self::StreamableHttp { url } | Self::Sse { url } => write!(f, "{} ({})", url, self.kind()),
        }
    }
}
