//! CLI command modules.

pub mod batches;
pub mod http;
pub mod rpc;
pub mod status;
