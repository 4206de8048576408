//! Subprocess agent runtime speaking NDJSON over stdio.
//!
//! Each turn spawns one instance of the configured runtime binary,
//! writes the prompt to its stdin, and parses one [`RuntimeMessage`]
//! per stdout line. Interrupting a turn kills the child.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::runtime::{AgentRuntime, RuntimeError, RuntimeMessage, TurnRequest, TurnStream};

/// Buffered message capacity between the reader task and the consumer.
const STREAM_CAPACITY: usize = 256;

/// [`AgentRuntime`] backed by an external CLI, one process per turn.
pub struct ProcessRuntime {
    command: String,
    args: Vec<String>,
}

impl ProcessRuntime {
    /// Runtime invoking `command` for each turn.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the per-turn flags.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn build_command(&self, request: &TurnRequest) -> tokio::process::Command {
        let config = &request.config;
        let mut cmd = tokio::process::Command::new(&self.command);
        let _ = cmd
            .args(&self.args)
            .arg("--model")
            .arg(&config.model)
            .current_dir(&config.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(prompt) = &config.system_prompt {
            let _ = cmd.arg("--system-prompt").arg(prompt);
        }
        if !config.allowed_tools.is_empty() {
            let _ = cmd.arg("--allowed-tools").arg(config.allowed_tools.join(","));
        }
        if let Some(session) = &request.resume_session_id {
            let _ = cmd.arg("--resume").arg(session);
        }
        cmd
    }
}

#[async_trait]
impl AgentRuntime for ProcessRuntime {
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnStream, RuntimeError> {
        let agent_id = request.config.id;
        let mut cmd = self.build_command(&request);
        debug!(agent_id = %agent_id, command = %self.command, "spawning runtime process");

        let mut child = cmd
            .spawn()
            .map_err(|e| RuntimeError::Spawn(format!("{}: {e}", self.command)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::Spawn("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Spawn("child stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        // Surface runtime diagnostics without mixing them into the
        // message stream.
        if let Some(stderr) = stderr {
            drop(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(agent_id = %agent_id, line, "runtime stderr");
                }
            }));
        }

        let interrupt = CancellationToken::new();
        let token = interrupt.clone();
        let prompt = request.prompt;
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);

        drop(tokio::spawn(async move {
            // EOF on stdin tells the runtime the prompt is complete.
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!(agent_id = %agent_id, error = %e, "failed to write prompt");
            }
            let _ = stdin.write_all(b"\n").await;
            drop(stdin);

            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    () = token.cancelled() => {
                        debug!(agent_id = %agent_id, "turn interrupted, killing runtime");
                        let _ = child.kill().await;
                        break;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => line,
                        Ok(None) | Err(_) => break,
                    },
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RuntimeMessage>(&line) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(agent_id = %agent_id, error = %e, "skipping unparseable runtime line");
                    }
                }
            }
            match child.wait().await {
                Ok(status) => debug!(agent_id = %agent_id, code = status.code(), "runtime exited"),
                Err(e) => warn!(agent_id = %agent_id, error = %e, "runtime wait failed"),
            }
            // tx drops here, closing the stream.
        }));

        Ok(TurnStream {
            interrupt,
            messages: rx,
        })
    }
}
