//! Terra client, running in the job's orchestrator. Submits shuffle info
//! to the controller.

use terra_core::config::ClientSettings;
use terra_core::wire::MessageKind;
use terra_core::{FlowBatch, FlowRecord, HelloReply, HelloRequest, SubmissionReply};

use crate::aggregate::aggregate;
use crate::channel::Channel;
use crate::error::{ChannelError, SubmissionError};
use crate::future::ResolvedFuture;
use crate::resolve::AddressTable;

pub struct TerraClient {
    channel: Channel,
}

impl TerraClient {
    /// Connect to the controller at `addr` ("host:port").
    pub async fn connect(addr: &str, settings: ClientSettings) -> Result<Self, ChannelError> {
        Ok(Self::from_channel(Channel::open(addr, settings).await?))
    }

    /// Use an existing channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Say hello to the controller.
    pub fn greet(&self, name: &str) -> Result<ResolvedFuture<HelloReply>, SubmissionError> {
        tracing::info!(name, "greeting controller");
        self.channel.call(
            MessageKind::HelloRequest,
            MessageKind::HelloReply,
            &HelloRequest {
                name: name.to_string(),
            },
        )
    }

    /// Send an already-built batch. Returns as soon as the request is queued.
    pub fn submit(
        &self,
        batch: &FlowBatch,
    ) -> Result<ResolvedFuture<SubmissionReply>, SubmissionError> {
        tracing::info!(
            job_id = %batch.job_id,
            submitter = %batch.submitter,
            flows = batch.flows.len(),
            "submitting shuffle info to controller"
        );
        self.channel.call(
            MessageKind::SubmitShuffleInfo,
            MessageKind::ShuffleInfoReply,
            batch,
        )
    }

    /// Resolve, aggregate and submit in one step.
    ///
    /// `flows_by_key` is conventionally keyed `user:job:map:reduce`; the
    /// address tables map task attempt ids to addresses.
    pub fn submit_shuffle_info<'a, K, I, M, R>(
        &self,
        username: &str,
        job_id: &str,
        mappers: &M,
        reducers: &R,
        flows_by_key: I,
    ) -> Result<ResolvedFuture<SubmissionReply>, SubmissionError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, &'a FlowRecord)>,
        M: AddressTable + ?Sized,
        R: AddressTable + ?Sized,
    {
        let batch = aggregate(job_id, username, flows_by_key, mappers, reducers);
        self.submit(&batch)
    }

    /// Close the channel, giving in-flight calls the configured grace period.
    pub async fn shutdown(&self) {
        self.channel.close().await;
    }
}
