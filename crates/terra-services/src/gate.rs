//! Confirmation gates: the external go-ahead a dispatch waits for.

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::{oneshot, Mutex};

use crate::dispatch::TransferDirective;

/// The gate could not produce a confirmation. The transfer must not run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("confirmation unavailable: {0}")]
pub struct ConfirmationUnavailable(pub String);

/// Source of the go-ahead for one transfer.
///
/// `confirm` suspends only the dispatch that called it.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, directive: &TransferDirective) -> Result<(), ConfirmationUnavailable>;
}

/// Always confirms.
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _directive: &TransferDirective) -> Result<(), ConfirmationUnavailable> {
        Ok(())
    }
}

/// Waits for one byte on the operator's stdin per confirmation.
///
/// Concurrent dispatches queue on the reader, one byte each.
pub struct StdinGate {
    stdin: Mutex<tokio::io::Stdin>,
}

impl StdinGate {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(tokio::io::stdin()),
        }
    }
}

impl Default for StdinGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, directive: &TransferDirective) -> Result<(), ConfirmationUnavailable> {
        let mut stdin = self.stdin.lock().await;
        tracing::info!(
            command = %directive.command_line(),
            "press Enter to proceed with transfer"
        );
        let mut byte = [0u8; 1];
        match stdin.read(&mut byte).await {
            Ok(0) => Err(ConfirmationUnavailable("stdin closed".into())),
            Ok(_) => Ok(()),
            Err(e) => Err(ConfirmationUnavailable(format!("error reading from operator: {e}"))),
        }
    }
}

/// Single-shot gate released through a oneshot channel.
///
/// The first `confirm` consumes the signal; later calls are unavailable.
/// Dropping the sender without sending also makes the gate unavailable.
pub struct SignalGate {
    signal: Mutex<Option<oneshot::Receiver<()>>>,
}

impl SignalGate {
    pub fn new() -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                signal: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl ConfirmationGate for SignalGate {
    async fn confirm(&self, _directive: &TransferDirective) -> Result<(), ConfirmationUnavailable> {
        let rx = self
            .signal
            .lock()
            .await
            .take()
            .ok_or_else(|| ConfirmationUnavailable("signal already consumed".into()))?;
        rx.await
            .map_err(|_| ConfirmationUnavailable("signal sender dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn directive() -> TransferDirective {
        TransferDirective {
            source_path: "/tmp/x/output".into(),
            destination_address: "h2:2".into(),
            destination_host: "h2".into(),
        }
    }

    #[tokio::test]
    async fn auto_confirm_proceeds() {
        assert!(AutoConfirm.confirm(&directive()).await.is_ok());
    }

    #[tokio::test]
    async fn signal_gate_waits_for_signal() {
        let (gate, tx) = SignalGate::new();
        let d = directive();
        let waiting = gate.confirm(&d);
        tokio::pin!(waiting);

        // Not released yet.
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut waiting)
            .await
            .is_err());

        tx.send(()).unwrap();
        assert!(waiting.await.is_ok());
    }

    #[tokio::test]
    async fn signal_gate_is_single_shot() {
        let (gate, tx) = SignalGate::new();
        tx.send(()).unwrap();
        assert!(gate.confirm(&directive()).await.is_ok());
        let err = gate.confirm(&directive()).await.unwrap_err();
        assert!(err.to_string().contains("already consumed"));
    }

    #[tokio::test]
    async fn dropped_sender_is_unavailable() {
        let (gate, tx) = SignalGate::new();
        drop(tx);
        assert!(gate.confirm(&directive()).await.is_err());
    }
}
