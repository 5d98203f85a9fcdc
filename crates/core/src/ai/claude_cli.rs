// crates/core/src/ai/claude_cli.rs
//! Claude CLI provider — spawns the `claude` binary and parses its output.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::provider::{AiProvider, ChunkReceiver};
use super::types::{AiError, CompletionRequest, CompletionResponse};

/// AI provider backed by the Claude CLI.
///
/// Buffered completions run `claude -p --output-format json`; streamed
/// completions use `--output-format text` and forward stdout lines.
pub struct ClaudeCliProvider {
    model: String,
    timeout_secs: u64,
}

impl ClaudeCliProvider {
    /// Create a provider for the given model name ("haiku", "sonnet", ...).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            timeout_secs: 60,
        }
    }

    /// Set the timeout in seconds for buffered CLI invocations.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn base_command(&self, output_format: &str, prompt: &str) -> Command {
        let mut cmd = Command::new("claude");
        cmd.args(["-p", "--output-format", output_format, "--model", &self.model, prompt])
            // Null stdin so the child never blocks waiting for input
            .stdin(std::process::Stdio::null());
        // Strip CLAUDE-prefixed env vars to prevent nested session detection.
        for (key, _) in std::env::vars() {
            if key.starts_with("CLAUDE") {
                cmd.env_remove(&key);
            }
        }
        cmd
    }

    async fn spawn_and_capture(&self, prompt: &str) -> Result<String, AiError> {
        let t0 = std::time::Instant::now();
        tracing::info!(model = %self.model, timeout_secs = self.timeout_secs, "claude CLI: spawning");

        let future = self.base_command("json", prompt).output();
        let output = timeout(Duration::from_secs(self.timeout_secs), future)
            .await
            .map_err(|_| {
                tracing::error!(elapsed_ms = t0.elapsed().as_millis() as u64, "claude CLI: timed out");
                AiError::Timeout(self.timeout_secs)
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "claude CLI: failed to spawn process");
                AiError::SpawnFailed(e.to_string())
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(exit_code = ?output.status.code(), stderr = %&stderr[..stderr.len().min(500)], "claude CLI: non-zero exit");
            return Err(AiError::Backend(stderr.to_string()));
        }

        tracing::info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            stdout_len = output.stdout.len(),
            "claude CLI: response received"
        );
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl AiProvider for ClaudeCliProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AiError> {
        let t0 = std::time::Instant::now();
        let stdout = self.spawn_and_capture(&request.combined_prompt()).await?;

        let parsed: serde_json::Value = serde_json::from_str(&stdout).map_err(|e| {
            tracing::warn!(stdout = %&stdout[..stdout.len().min(500)], "claude CLI: returned non-JSON");
            AiError::ParseFailed(e.to_string())
        })?;

        // The CLI wraps output in { "result": "..." }.
        let content = parsed["result"]
            .as_str()
            .or_else(|| parsed["content"].as_str())
            .unwrap_or("")
            .to_string();

        Ok(CompletionResponse {
            content,
            latency_ms: t0.elapsed().as_millis() as u64,
        })
    }

    fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<(ChunkReceiver, tokio::task::JoinHandle<Result<(), AiError>>), AiError> {
        tracing::info!(model = %self.model, "claude CLI: spawning streamed completion");

        let mut child = self
            .base_command("text", &request.combined_prompt())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                tracing::error!(error = %e, "claude CLI: failed to spawn streamed completion");
                AiError::SpawnFailed(e.to_string())
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AiError::SpawnFailed("failed to capture stdout".to_string()))?;

        let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);

        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    // Receiver dropped — abort the child
                    let _ = child.kill().await;
                    return Ok(());
                }
            }

            let status = child
                .wait()
                .await
                .map_err(|e| AiError::SpawnFailed(format!("failed to wait for CLI: {e}")))?;
            if !status.success() {
                tracing::warn!(exit_code = ?status.code(), "claude CLI: streamed completion non-zero exit");
                return Err(AiError::Backend(format!(
                    "CLI exited with code {:?}",
                    status.code()
                )));
            }
            Ok(())
        });

        Ok((rx, handle))
    }

    async fn health_check(&self) -> Result<(), AiError> {
        let output = Command::new("claude")
            .arg("--version")
            .output()
            .await
            .map_err(|e| AiError::SpawnFailed(format!("claude not found: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AiError::NotAvailable("claude --version failed".into()))
        }
    }

    fn name(&self) -> &str {
        "claude-cli"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Extract the first balanced JSON object `{...}` from a text string.
///
/// Models sometimes wrap JSON in markdown fences or explanation text;
/// executors use this to recover the structured part.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut end = None;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    serde_json::from_str(&text[start..end?]).ok()
}
