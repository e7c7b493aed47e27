//! HTTP API handlers — exposes controller state as JSON.

pub mod batches;
pub mod status;

use std::time::Instant;

use terra_services::BatchStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: BatchStore,
    /// Address the RPC server is bound to.
    pub listen_addr: String,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(store: BatchStore, listen_addr: impl Into<String>) -> Self {
        Self {
            store,
            listen_addr: listen_addr.into(),
            started_at: Instant::now(),
        }
    }
}

pub use batches::{handle_batch, handle_batches};
pub use status::handle_status;
