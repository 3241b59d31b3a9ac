// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Child-process transport: newline-delimited JSON over stdin/stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Transport;
use crate::mcp::config::{ServerConfig, TransportType};
use crate::mcp::error::McpError;

/// Time a child gets to exit on its own after stdin closes.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Transport over a spawned server process.
///
/// The child is spawned with `kill_on_drop`, so it never outlives the
/// transport even when a handshake fails halfway.
pub struct StdioTransport {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawn `program args...` with the server's env and cwd.
    pub fn spawn(program: &str, args: &[String], config: &ServerConfig) -> Result<Self, McpError> {
        let mut cmd = Command::new(program);
        cmd.args(args);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::transport(format!("failed to spawn '{}': {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("child stdout unavailable"))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let label = config.label();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %label, "stderr: {}", line);
                }
            })
        });

        debug!(program, pid = ?child.id(), "Spawned tool server");

        Ok(Self {
            program: program.to_string(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &Value) -> Result<(), McpError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| McpError::transport("stdin already closed"))?;

        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Value>, McpError> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => warn!(program = %self.program, error = %e, "Skipping non-JSON stdout line"),
            }
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        // EOF on stdin is the polite shutdown signal.
        drop(self.stdin.take());

        match tokio::time::timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(program = %self.program, %status, "Tool server exited"),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                debug!(program = %self.program, "Tool server still running, killing");
                self.child.kill().await?;
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }

    fn kind(&self) -> TransportType {
        TransportType::Stdio
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str) -> StdioTransport {
        let config = ServerConfig::command("sh", ["-c", script]);
        StdioTransport::spawn("sh", &["-c".to_string(), script.to_string()], &config).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_through_cat() {
        let mut transport = shell("cat");
        transport.send(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await.unwrap();

        let echoed = transport.receive().await.unwrap().unwrap();
        assert_eq!(echoed["method"], "ping");

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_skips_non_json_lines() {
        let mut transport = shell("echo 'starting up...'; echo '{\"id\": 7}'");
        let message = transport.receive().await.unwrap().unwrap();
        assert_eq!(message["id"], 7);
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_kills_stubborn_child() {
        let mut transport = shell("trap '' TERM; sleep 30");
        let started = std::time::Instant::now();
        transport.close().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let mut transport = shell("cat");
        transport.close().await.unwrap();
        let result = transport.send(&json!({})).await;
        assert!(matches!(result, Err(McpError::Transport(_))));
    }
}
