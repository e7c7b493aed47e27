//! Shuffle data model: flows, batches and the RPC payload shapes.
//!
//! A `FlowRecord` describes one data segment moving from a source (mapper)
//! task to a destination (reducer) task. A `FlowBatch` is the unit submitted
//! to the controller.

use serde::{Deserialize, Serialize};

/// One data-segment transfer.
///
/// `source_address` / `dest_address` are `None` when the endpoint is not
/// known. That is a valid state: the controller may resolve it another way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Mapper task attempt id.
    pub source_task_id: String,
    /// Reducer task attempt id.
    pub dest_task_id: String,
    /// Location of the data segment on the source host.
    pub data_path: String,
    pub start_offset: u64,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_address: Option<String>,
}

impl FlowRecord {
    /// A flow with both endpoints unresolved.
    pub fn new(
        source_task_id: impl Into<String>,
        dest_task_id: impl Into<String>,
        data_path: impl Into<String>,
        start_offset: u64,
        size_bytes: u64,
    ) -> Self {
        Self {
            source_task_id: source_task_id.into(),
            dest_task_id: dest_task_id.into(),
            data_path: data_path.into(),
            start_offset,
            size_bytes,
            source_address: None,
            dest_address: None,
        }
    }

    pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    pub fn with_dest_address(mut self, address: impl Into<String>) -> Self {
        self.dest_address = Some(address.into());
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.source_address.is_some() && self.dest_address.is_some()
    }
}

/// The two ends of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Source,
    Destination,
}

/// Conventional batch key: `user:job:sourceTask:destTask`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey(String);

impl FlowKey {
    pub fn new(user: &str, job_id: &str, source_task_id: &str, dest_task_id: &str) -> Self {
        Self(format!("{user}:{job_id}:{source_task_id}:{dest_task_id}"))
    }

    pub fn for_flow(user: &str, job_id: &str, flow: &FlowRecord) -> Self {
        Self::new(user, job_id, &flow.source_task_id, &flow.dest_task_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flows submitted together under one job and submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowBatch {
    pub job_id: String,
    /// User that submitted the job.
    pub submitter: String,
    /// In aggregation order.
    pub flows: Vec<FlowRecord>,
}

impl FlowBatch {
    pub fn new(job_id: impl Into<String>, submitter: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            submitter: submitter.into(),
            flows: Vec::new(),
        }
    }

    /// Hex BLAKE3 hash of the batch's JSON encoding. Identical batches share an id.
    pub fn batch_id(&self) -> String {
        // Serializing plain strings and integers cannot fail.
        let raw = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(blake3::hash(&raw).as_bytes())
    }

    /// Total bytes across all flows.
    pub fn total_bytes(&self) -> u64 {
        self.flows.iter().map(|f| f.size_bytes).sum()
    }

    /// Number of flows missing at least one endpoint address.
    pub fn unresolved_count(&self) -> usize {
        self.flows.iter().filter(|f| !f.is_resolved()).count()
    }
}

/// Controller acknowledgement of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReply {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubmissionReply {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: Some(message.into()),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

/// Host part of a `host:port` address. Addresses without a port are returned whole.
pub fn host_of(address: &str) -> &str {
    address.split_once(':').map_or(address, |(host, _)| host)
}
