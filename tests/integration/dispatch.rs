use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use terra_client::TerraClient;
use terra_services::{
    AutoConfirm, ConfirmationGate, ConfirmationUnavailable, DispatchOutcome, SignalGate,
    TransferDirective,
};

use crate::*;

/// Holds back transfers whose path mentions "slow"; confirms the rest.
struct SelectiveGate;

#[async_trait]
impl ConfirmationGate for SelectiveGate {
    async fn confirm(&self, directive: &TransferDirective) -> Result<(), ConfirmationUnavailable> {
        if directive.source_path.contains("slow") {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_gate_failure_skips_executor() {
    let (gate, release) = SignalGate::new();
    drop(release);
    let executor = Arc::new(RecordingExecutor::default());
    let controller = start_controller(Arc::new(gate), executor.clone()).await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let s = scenario("j-gate", "/tmp/x/output/a.out");
    let reply = client
        .submit_shuffle_info("u", "j-gate", &s.mappers, &s.reducers, &s.flows)
        .unwrap()
        .await
        .unwrap();

    // The reply is unaffected by the gate.
    assert!(reply.accepted);
    let outcome = wait_for_outcome(&controller.store, &reply.message.unwrap()).await;
    assert!(matches!(outcome, DispatchOutcome::ConfirmationUnavailable(_)));
    assert!(executor.calls().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_batch_dispatched_once() {
    let executor = Arc::new(RecordingExecutor::default());
    let controller = start_controller(Arc::new(AutoConfirm), executor.clone()).await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let s = scenario("j-dup", "/tmp/x/output/a.out");
    let first = client
        .submit_shuffle_info("u", "j-dup", &s.mappers, &s.reducers, &s.flows)
        .unwrap()
        .await
        .unwrap();
    let second = client
        .submit_shuffle_info("u", "j-dup", &s.mappers, &s.reducers, &s.flows)
        .unwrap()
        .await
        .unwrap();

    assert!(first.accepted && second.accepted);
    assert_eq!(first.message, second.message);

    let batch_id = first.message.unwrap();
    wait_for_outcome(&controller.store, &batch_id).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(executor.calls().len(), 1);
    assert_eq!(controller.store.for_job("j-dup"), vec![batch_id]);
    client.shutdown().await;
}

/// A batch stuck at its gate does not hold up other batches.
#[tokio::test]
async fn test_waiting_batch_does_not_block_others() {
    let executor = Arc::new(RecordingExecutor::default());
    let controller = start_controller(Arc::new(SelectiveGate), executor.clone()).await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let slow = scenario("j-slow", "/slow/output/a.out");
    let fast = scenario("j-fast", "/fast/output/a.out");
    let slow_reply = client
        .submit_shuffle_info("u", "j-slow", &slow.mappers, &slow.reducers, &slow.flows)
        .unwrap()
        .await
        .unwrap();
    let fast_reply = client
        .submit_shuffle_info("u", "j-fast", &fast.mappers, &fast.reducers, &fast.flows)
        .unwrap()
        .await
        .unwrap();

    let fast_id = fast_reply.message.unwrap();
    assert_eq!(
        wait_for_outcome(&controller.store, &fast_id).await,
        DispatchOutcome::Dispatched
    );
    assert_eq!(
        executor.calls(),
        vec![("/fast/output".to_string(), "h2:2".to_string())]
    );

    let slow_record = controller.store.get(&slow_reply.message.unwrap()).unwrap();
    assert!(slow_record.outcome.is_none());
    assert_eq!(controller.store.counts().awaiting_decision, 1);
    client.shutdown().await;
}
