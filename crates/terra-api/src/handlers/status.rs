use axum::extract::State;
use axum::Json;
use serde::Serialize;

use terra_services::BatchCounts;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub listen_addr: String,
    pub uptime_secs: u64,
    pub batches: BatchCounts,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        listen_addr: state.listen_addr.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        batches: state.store.counts(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_core::FlowBatch;
    use terra_services::BatchStore;

    #[tokio::test]
    async fn status_reports_counts() {
        let store = BatchStore::new();
        store.insert(FlowBatch::new("j1", "u"));
        let state = ApiState::new(store, "0.0.0.0:50051");

        let Json(status) = handle_status(State(state)).await;
        assert_eq!(status.listen_addr, "0.0.0.0:50051");
        assert_eq!(status.batches.total, 1);
        assert_eq!(status.batches.awaiting_decision, 1);
    }
}
