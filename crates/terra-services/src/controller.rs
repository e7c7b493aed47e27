//! The controller's `ShuffleService`: records batches, acknowledges them,
//! and runs one dispatch task per new batch. Resubmitting a batch whose
//! dispatch failed starts a fresh dispatch.

use anyhow::Result;
use async_trait::async_trait;

use terra_core::{FlowBatch, HelloReply, HelloRequest, SubmissionReply};

use crate::batch_store::{Admission, BatchStore};
use crate::dispatch::DispatchStub;
use crate::service::ShuffleService;

pub struct ControllerService {
    store: BatchStore,
    stub: DispatchStub,
}

impl ControllerService {
    pub fn new(store: BatchStore, stub: DispatchStub) -> Self {
        Self { store, stub }
    }

    pub fn store(&self) -> &BatchStore {
        &self.store
    }

    fn spawn_dispatch(&self, batch_id: String, batch: FlowBatch) {
        let store = self.store.clone();
        let stub = self.stub.clone();
        tokio::spawn(async move {
            let tracker = store.clone();
            let id = batch_id.clone();
            let outcome = stub
                .dispatch(&batch, move |state| tracker.set_state(&id, state))
                .await;
            tracing::debug!(batch_id = %batch_id, ?outcome, "dispatch finished");
            store.finish(&batch_id, outcome);
        });
    }
}

#[async_trait]
impl ShuffleService for ControllerService {
    async fn hello(&self, request: HelloRequest) -> Result<HelloReply> {
        tracing::info!(name = %request.name, "greeting received");
        Ok(HelloReply {
            message: format!("Hello {}", request.name),
        })
    }

    async fn submit_shuffle_info(&self, batch: FlowBatch) -> Result<SubmissionReply> {
        tracing::info!(
            job_id = %batch.job_id,
            submitter = %batch.submitter,
            flows = batch.flows.len(),
            bytes = batch.total_bytes(),
            unresolved = batch.unresolved_count(),
            "shuffle info received"
        );
        for flow in &batch.flows {
            tracing::debug!(
                source = %flow.source_task_id,
                dest = %flow.dest_task_id,
                path = %flow.data_path,
                offset = flow.start_offset,
                size = flow.size_bytes,
                "flow"
            );
        }

        let (batch_id, admission) = self.store.insert(batch.clone());
        match admission {
            Admission::New => self.spawn_dispatch(batch_id.clone(), batch),
            Admission::Retry => {
                tracing::info!(batch_id = %batch_id, "previous dispatch failed, retrying");
                self.spawn_dispatch(batch_id.clone(), batch);
            }
            Admission::Duplicate => {
                tracing::info!(batch_id = %batch_id, "duplicate batch, dispatch pending or done");
            }
        }
        Ok(SubmissionReply::accepted(batch_id))
    }
}
