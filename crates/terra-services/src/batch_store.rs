use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use terra_core::FlowBatch;

use crate::dispatch::{DispatchOutcome, DispatchState};

/// Full controller-side state of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    /// Content id (`FlowBatch::batch_id`).
    pub batch_id: String,
    pub batch: FlowBatch,
    pub state: DispatchState,
    /// Populated when the dispatch task finishes.
    pub outcome: Option<DispatchOutcome>,
    /// Unix ms when the batch was first received.
    pub received_at: u64,
    /// Unix ms of the last state change.
    pub updated_at: u64,
    /// Dispatches started for this batch; resubmitting a failed batch
    /// starts another.
    pub attempts: u32,
}

/// What `BatchStore::insert` did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First time this batch was seen.
    New,
    /// The previous dispatch failed; the record was reset for another try.
    Retry,
    /// A dispatch is pending or already succeeded.
    Duplicate,
}

impl Admission {
    pub fn needs_dispatch(self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

/// Batch counts for the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub total: usize,
    pub awaiting_decision: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// In-memory store for received batches.
#[derive(Clone, Default)]
pub struct BatchStore {
    /// batch_id → BatchRecord
    batches: Arc<DashMap<String, BatchRecord>>,
    /// job_id → batch ids received for that job
    job_batches: Arc<DashMap<String, Vec<String>>>,
    /// Finished records kept before the oldest are evicted. 0 = unlimited.
    retention: usize,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that keeps at most `retention` records once they are
    /// finished. Records still awaiting a decision are never evicted.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    /// Record a received batch. Returns the batch id and whether a dispatch
    /// should be started for it.
    pub fn insert(&self, batch: FlowBatch) -> (String, Admission) {
        let batch_id = batch.batch_id();
        let job_id = batch.job_id.clone();
        let now = now_ms();
        let admission = match self.batches.entry(batch_id.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                match &record.outcome {
                    Some(outcome) if !outcome.is_dispatched() => {
                        record.state = DispatchState::AwaitingDecision;
                        record.outcome = None;
                        record.attempts += 1;
                        record.updated_at = now;
                        Admission::Retry
                    }
                    _ => Admission::Duplicate,
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(BatchRecord {
                    batch_id: batch_id.clone(),
                    batch,
                    state: DispatchState::AwaitingDecision,
                    outcome: None,
                    received_at: now,
                    updated_at: now,
                    attempts: 1,
                });
                Admission::New
            }
        };
        if admission == Admission::New {
            self.job_batches
                .entry(job_id)
                .or_default()
                .push(batch_id.clone());
            self.evict();
        }
        (batch_id, admission)
    }

    /// Drop the oldest finished records beyond the retention limit.
    fn evict(&self) {
        if self.retention == 0 {
            return;
        }
        let excess = self.batches.len().saturating_sub(self.retention);
        if excess == 0 {
            return;
        }
        let mut finished: Vec<(u64, String, String)> = self
            .batches
            .iter()
            .filter(|r| r.outcome.is_some())
            .map(|r| (r.received_at, r.batch_id.clone(), r.batch.job_id.clone()))
            .collect();
        finished.sort();

        let mut evicted = 0usize;
        for (_, batch_id, job_id) in finished.into_iter().take(excess) {
            self.batches.remove(&batch_id);
            if let Some(mut ids) = self.job_batches.get_mut(&job_id) {
                ids.retain(|id| id != &batch_id);
            }
            self.job_batches.remove_if(&job_id, |_, ids| ids.is_empty());
            evicted += 1;
        }
        tracing::debug!(evicted, retained = self.batches.len(), "batch records evicted");
    }

    pub fn set_state(&self, batch_id: &str, state: DispatchState) {
        if let Some(mut record) = self.batches.get_mut(batch_id) {
            record.state = state;
            record.updated_at = now_ms();
        }
    }

    /// Store the dispatch outcome.
    pub fn finish(&self, batch_id: &str, outcome: DispatchOutcome) {
        if let Some(mut record) = self.batches.get_mut(batch_id) {
            record.outcome = Some(outcome);
            record.updated_at = now_ms();
        }
    }

    pub fn get(&self, batch_id: &str) -> Option<BatchRecord> {
        self.batches.get(batch_id).map(|r| r.clone())
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<BatchRecord> {
        let mut records: Vec<BatchRecord> = self.batches.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.batch_id.cmp(&b.batch_id))
        });
        records
    }

    /// Batch ids received for `job_id`, in arrival order.
    pub fn for_job(&self, job_id: &str) -> Vec<String> {
        self.job_batches
            .get(job_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for record in self.batches.iter() {
            counts.total += 1;
            match (&record.state, &record.outcome) {
                (_, Some(outcome)) if !outcome.is_dispatched() => counts.failed += 1,
                (DispatchState::AwaitingDecision, _) => counts.awaiting_decision += 1,
                (DispatchState::Dispatched, _) => counts.dispatched += 1,
            }
        }
        counts
    }
}
