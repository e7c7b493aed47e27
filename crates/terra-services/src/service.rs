//! Service trait for the controller's RPC surface.
//!
//! The server decodes frames and hands typed requests to a `ShuffleService`;
//! the service never sees the wire.

use anyhow::Result;
use async_trait::async_trait;

use terra_core::{FlowBatch, HelloReply, HelloRequest, SubmissionReply};

#[async_trait]
pub trait ShuffleService: Send + Sync + 'static {
    async fn hello(&self, request: HelloRequest) -> Result<HelloReply>;

    /// Accept one batch. Returning means the batch has been recorded, not
    /// that its transfer has happened.
    async fn submit_shuffle_info(&self, batch: FlowBatch) -> Result<SubmissionReply>;
}
