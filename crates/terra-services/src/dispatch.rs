//! Controller-side dispatch stub.
//!
//! Turns an accepted batch into a `TransferDirective`, waits on the
//! confirmation gate, then hands the directive to the transfer executor.
//! Only the first flow of a batch is considered: every flow of a job's
//! shuffle shares one output directory and one destination.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use terra_core::{host_of, FlowBatch};

use crate::executor::TransferExecutor;
use crate::gate::ConfirmationGate;

/// What the controller will move, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDirective {
    /// Data directory on the source host.
    pub source_path: String,
    /// Full `host:port` of the destination.
    pub destination_address: String,
    pub destination_host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("batch has no flows")]
    EmptyBatch,
    #[error("first flow ({0}) has no destination address")]
    MissingDestination(String),
}

impl TransferDirective {
    /// Build the directive from the batch's first flow.
    pub fn from_batch(batch: &FlowBatch, output_marker: &str) -> Result<Self, DispatchError> {
        let flow = batch.flows.first().ok_or(DispatchError::EmptyBatch)?;
        let destination_address = flow
            .dest_address
            .clone()
            .ok_or_else(|| DispatchError::MissingDestination(flow.dest_task_id.clone()))?;
        Ok(Self {
            source_path: output_dir(&flow.data_path, output_marker).to_string(),
            destination_host: host_of(&destination_address).to_string(),
            destination_address,
        })
    }

    /// The equivalent shell command, for logs and operator prompts.
    pub fn command_line(&self) -> String {
        format!(
            "scp -r {} {}:{}",
            self.source_path, self.destination_host, self.source_path
        )
    }
}

/// `path` cut just after the last path component equal to `marker`.
///
/// "/tmp/x/output/a.out" → "/tmp/x/output". Paths without such a component
/// (or an empty marker) come back unchanged.
pub fn output_dir<'a>(path: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return path;
    }
    let mut end = path.len();
    while let Some(at) = path[..end].rfind(marker) {
        let stop = at + marker.len();
        let starts = at == 0 || path[..at].ends_with('/');
        let ends = stop == path.len() || path[stop..].starts_with('/');
        if starts && ends {
            return &path[..stop];
        }
        end = at;
    }
    path
}

/// Per-batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    AwaitingDecision,
    Dispatched,
}

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched,
    ExecutorFailed(String),
    ConfirmationUnavailable(String),
    NoDirective(String),
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched)
    }
}

/// Gate + executor pair shared by every dispatch task.
#[derive(Clone)]
pub struct DispatchStub {
    gate: Arc<dyn ConfirmationGate>,
    executor: Arc<dyn TransferExecutor>,
    output_marker: String,
}

impl DispatchStub {
    pub fn new(
        gate: Arc<dyn ConfirmationGate>,
        executor: Arc<dyn TransferExecutor>,
        output_marker: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            executor,
            output_marker: output_marker.into(),
        }
    }

    /// Run one batch through the gate and the executor.
    ///
    /// `on_transition` is called with `Dispatched` right before the executor
    /// runs. The executor runs at most once per call.
    pub async fn dispatch<F>(&self, batch: &FlowBatch, on_transition: F) -> DispatchOutcome
    where
        F: FnOnce(DispatchState) + Send,
    {
        let directive = match TransferDirective::from_batch(batch, &self.output_marker) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(job_id = %batch.job_id, error = %e, "cannot dispatch batch");
                return DispatchOutcome::NoDirective(e.to_string());
            }
        };

        tracing::info!(
            job_id = %batch.job_id,
            source_path = %directive.source_path,
            destination = %directive.destination_address,
            command = %directive.command_line(),
            "awaiting confirmation"
        );

        if let Err(e) = self.gate.confirm(&directive).await {
            tracing::warn!(job_id = %batch.job_id, error = %e, "transfer not confirmed");
            return DispatchOutcome::ConfirmationUnavailable(e.0);
        }

        on_transition(DispatchState::Dispatched);
        match self
            .executor
            .execute(&directive.source_path, &directive.destination_address)
            .await
        {
            Ok(()) => {
                tracing::info!(job_id = %batch.job_id, "transfer dispatched");
                DispatchOutcome::Dispatched
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(job_id = %batch.job_id, error = %reason, "transfer failed");
                DispatchOutcome::ExecutorFailed(reason)
            }
        }
    }
}
