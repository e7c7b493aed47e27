use std::sync::Arc;

use terra_client::TerraClient;
use terra_services::{DispatchOutcome, DispatchState, SignalGate};

use crate::*;

/// Resolve → aggregate → submit → ack → confirm → transfer, end to end.
#[tokio::test]
async fn test_shuffle_submission_end_to_end() {
    let (gate, release) = SignalGate::new();
    let executor = Arc::new(RecordingExecutor::default());
    let controller = start_controller(Arc::new(gate), executor.clone()).await;

    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();
    let s = scenario("j1", "/tmp/x/output/a.out");
    let reply = client
        .submit_shuffle_info("u", "j1", &s.mappers, &s.reducers, &s.flows)
        .unwrap()
        .await
        .unwrap();

    assert!(reply.accepted);
    let batch_id = reply.message.unwrap();

    // Acknowledged before the operator confirmed anything.
    let record = controller.store.get(&batch_id).unwrap();
    assert_eq!(record.state, DispatchState::AwaitingDecision);
    assert!(executor.calls().is_empty());

    // The controller saw the resolved flow.
    assert_eq!(record.batch.job_id, "j1");
    assert_eq!(record.batch.submitter, "u");
    assert_eq!(record.batch.flows.len(), 1);
    let flow = &record.batch.flows[0];
    assert_eq!(flow.source_address.as_deref(), Some("h1:1"));
    assert_eq!(flow.dest_address.as_deref(), Some("h2:2"));

    release.send(()).unwrap();
    assert_eq!(
        wait_for_outcome(&controller.store, &batch_id).await,
        DispatchOutcome::Dispatched
    );
    assert_eq!(
        executor.calls(),
        vec![("/tmp/x/output".to_string(), "h2:2".to_string())]
    );
    assert_eq!(
        controller.store.get(&batch_id).unwrap().state,
        DispatchState::Dispatched
    );

    client.shutdown().await;
}

/// `get()` blocks a plain thread until the controller replies.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_get_returns_ack() {
    let executor = Arc::new(RecordingExecutor::default());
    let controller = start_controller(Arc::new(terra_services::AutoConfirm), executor).await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let s = scenario("j-blocking", "/data/output/part-0");
    let future = client
        .submit_shuffle_info("u", "j-blocking", &s.mappers, &s.reducers, &s.flows)
        .unwrap();

    let reply = tokio::task::spawn_blocking(move || future.get())
        .await
        .unwrap()
        .unwrap();
    assert!(reply.accepted);
    client.shutdown().await;
}

/// A flow whose reducer is not in the table still reaches the controller,
/// which records it and declines to dispatch it.
#[tokio::test]
async fn test_unresolved_destination_is_submitted_but_not_dispatched() {
    let executor = Arc::new(RecordingExecutor::default());
    let controller =
        start_controller(Arc::new(terra_services::AutoConfirm), executor.clone()).await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let mut s = scenario("j-unresolved", "/tmp/x/output/a.out");
    s.reducers.clear();
    let reply = client
        .submit_shuffle_info("u", "j-unresolved", &s.mappers, &s.reducers, &s.flows)
        .unwrap()
        .await
        .unwrap();
    assert!(reply.accepted);

    let batch_id = reply.message.unwrap();
    let record = controller.store.get(&batch_id).unwrap();
    assert_eq!(record.batch.flows[0].source_address.as_deref(), Some("h1:1"));
    assert!(record.batch.flows[0].dest_address.is_none());

    let outcome = wait_for_outcome(&controller.store, &batch_id).await;
    assert!(matches!(outcome, DispatchOutcome::NoDirective(_)));
    assert!(executor.calls().is_empty());
    client.shutdown().await;
}
