//! /batches handlers: batches received by the controller.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use terra_services::{BatchRecord, DispatchOutcome, DispatchState};

use super::ApiState;

// ── /batches (GET) ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct BatchesQuery {
    /// Only batches for this job.
    pub job: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchesResponse {
    pub batches: Vec<BatchSummary>,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub job_id: String,
    pub submitter: String,
    pub flows: usize,
    pub total_bytes: u64,
    pub unresolved: usize,
    pub state: DispatchState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DispatchOutcome>,
    pub received_at: u64,
    pub updated_at: u64,
    pub attempts: u32,
}

fn summarize(record: BatchRecord) -> BatchSummary {
    BatchSummary {
        flows: record.batch.flows.len(),
        total_bytes: record.batch.total_bytes(),
        unresolved: record.batch.unresolved_count(),
        job_id: record.batch.job_id,
        submitter: record.batch.submitter,
        batch_id: record.batch_id,
        state: record.state,
        outcome: record.outcome,
        received_at: record.received_at,
        updated_at: record.updated_at,
        attempts: record.attempts,
    }
}

pub async fn handle_batches(
    State(state): State<ApiState>,
    Query(query): Query<BatchesQuery>,
) -> Json<BatchesResponse> {
    let records = match query.job {
        Some(job) => state
            .store
            .for_job(&job)
            .iter()
            .filter_map(|id| state.store.get(id))
            .collect(),
        None => state.store.all(),
    };
    Json(BatchesResponse {
        batches: records.into_iter().map(summarize).collect(),
    })
}

// ── /batches/{id} (GET) ──────────────────────────────────────────────────────

pub async fn handle_batch(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<BatchRecord>, (StatusCode, String)> {
    state
        .store
        .get(&id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no batch {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_core::{FlowBatch, FlowRecord};
    use terra_services::BatchStore;

    fn state_with_batches() -> (ApiState, String) {
        let store = BatchStore::new();
        let mut batch = FlowBatch::new("j1", "u");
        batch
            .flows
            .push(FlowRecord::new("M1", "R1", "/tmp/x/output/a.out", 0, 500).with_dest_address("h2:2"));
        let (id, _) = store.insert(batch);
        store.insert(FlowBatch::new("j2", "u"));
        (ApiState::new(store, "127.0.0.1:50051"), id)
    }

    #[tokio::test]
    async fn lists_all_batches() {
        let (state, _) = state_with_batches();
        let Json(resp) = handle_batches(State(state), Query(BatchesQuery::default())).await;
        assert_eq!(resp.batches.len(), 2);
    }

    #[tokio::test]
    async fn filters_by_job() {
        let (state, id) = state_with_batches();
        let Json(resp) = handle_batches(
            State(state),
            Query(BatchesQuery {
                job: Some("j1".into()),
            }),
        )
        .await;
        assert_eq!(resp.batches.len(), 1);
        let summary = &resp.batches[0];
        assert_eq!(summary.batch_id, id);
        assert_eq!(summary.flows, 1);
        assert_eq!(summary.total_bytes, 500);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.state, DispatchState::AwaitingDecision);
    }

    #[tokio::test]
    async fn unknown_batch_is_not_found() {
        let (state, id) = state_with_batches();
        let Json(record) = handle_batch(State(state.clone()), Path(id.clone())).await.unwrap();
        assert_eq!(record.batch_id, id);

        let err = handle_batch(State(state), Path("nope".into())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
