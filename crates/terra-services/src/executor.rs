//! Transfer executors: whatever physically moves the data once a dispatch
//! is confirmed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use terra_core::host_of;

#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Move `source_path` to the host at `destination_address`.
    async fn execute(&self, source_path: &str, destination_address: &str) -> Result<()>;
}

/// Copies the directory with `scp -r <path> <host>:<path>`.
pub struct ScpExecutor {
    program: String,
}

impl ScpExecutor {
    pub fn new() -> Self {
        Self {
            program: "scp".to_string(),
        }
    }

    /// Use a different scp-compatible binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(source_path: &str, destination_address: &str) -> Vec<String> {
        vec![
            "-r".to_string(),
            source_path.to_string(),
            format!("{}:{}", host_of(destination_address), source_path),
        ]
    }
}

impl Default for ScpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferExecutor for ScpExecutor {
    async fn execute(&self, source_path: &str, destination_address: &str) -> Result<()> {
        let args = Self::args(source_path, destination_address);
        tracing::info!(program = %self.program, ?args, "invoking transfer");

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", self.program))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with code {}: {}", self.program, code, stderr.trim());
        }
        Ok(())
    }
}

/// Logs the transfer and does nothing else.
pub struct LogOnlyExecutor;

#[async_trait]
impl TransferExecutor for LogOnlyExecutor {
    async fn execute(&self, source_path: &str, destination_address: &str) -> Result<()> {
        tracing::info!(source_path, destination_address, "transfer (log only)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scp_args_target_destination_host() {
        assert_eq!(
            ScpExecutor::args("/tmp/x/output", "h2:2"),
            vec!["-r", "/tmp/x/output", "h2:/tmp/x/output"]
        );
    }

    #[tokio::test]
    async fn failing_program_is_an_error() {
        let exec = ScpExecutor::with_program("false");
        let err = exec.execute("/tmp/x/output", "h2:2").await.unwrap_err();
        assert!(err.to_string().contains("exited with code"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let exec = ScpExecutor::with_program("/nonexistent/terra-scp");
        let err = exec.execute("/tmp/x/output", "h2:2").await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn succeeding_program_is_ok() {
        // `true` ignores its arguments.
        let exec = ScpExecutor::with_program("true");
        assert!(exec.execute("/tmp/x/output", "h2:2").await.is_ok());
    }

    #[tokio::test]
    async fn log_only_always_succeeds() {
        assert!(LogOnlyExecutor.execute("/a", "b:1").await.is_ok());
    }
}
