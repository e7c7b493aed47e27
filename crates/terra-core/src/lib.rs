//! terra-core — shared data model, wire framing, and configuration.
//! All other Terra crates depend on this one.

pub mod config;
pub mod flow;
pub mod wire;

pub use flow::{
    host_of, Endpoint, FlowBatch, FlowKey, FlowRecord, HelloReply, HelloRequest, SubmissionReply,
};
