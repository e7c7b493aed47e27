use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use terra_client::{RpcFailure, SubmissionError, TerraClient};
use terra_core::config::ClientSettings;
use terra_core::wire;
use terra_core::FlowBatch;
use terra_services::AutoConfirm;

use crate::*;

/// A peer that accepts one connection, reads requests and never answers.
/// Dropping the returned sender closes the connection.
async fn silent_peer() -> (String, tokio::sync::oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (hangup, hung_up) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let reading = async { while let Ok(Some(_)) = wire::read_frame(&mut stream).await {} };
        tokio::select! {
            _ = reading => {}
            _ = hung_up => {}
        }
    });
    (addr, hangup)
}

#[tokio::test]
async fn test_greet() {
    let controller = start_controller(
        Arc::new(AutoConfirm),
        Arc::new(RecordingExecutor::default()),
    )
    .await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let reply = client.greet("maxi").unwrap().await.unwrap();
    assert_eq!(reply.message, "Hello maxi");
    client.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_calls_pair_with_their_replies() {
    let controller = start_controller(
        Arc::new(AutoConfirm),
        Arc::new(RecordingExecutor::default()),
    )
    .await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    let futures: Vec<_> = (0..16)
        .map(|i| client.greet(&format!("n{i}")).unwrap())
        .collect();
    for (i, future) in futures.into_iter().enumerate() {
        assert_eq!(future.await.unwrap().message, format!("Hello n{i}"));
    }
    client.shutdown().await;
}

/// Cancel racing a real reply: the future settles on exactly one of them.
#[tokio::test]
async fn test_cancel_settles_on_one_outcome() {
    let controller = start_controller(
        Arc::new(AutoConfirm),
        Arc::new(RecordingExecutor::default()),
    )
    .await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();

    for i in 0..20 {
        let future = client.submit(&FlowBatch::new(format!("j-cancel-{i}"), "u")).unwrap();
        let cancelled = future.cancel();
        let first = loop {
            if let Some(outcome) = future.try_get() {
                break outcome;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        match &first {
            Err(RpcFailure::Cancelled) => assert!(cancelled),
            Ok(reply) => {
                assert!(!cancelled);
                assert!(reply.accepted);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // Stable once settled.
        assert_eq!(future.try_get(), Some(first));
    }

    // The channel is still usable afterwards.
    assert!(client.greet("after").unwrap().await.is_ok());
    client.shutdown().await;
}

#[tokio::test]
async fn test_request_timeout() {
    let (addr, _hangup) = silent_peer().await;
    let client = TerraClient::connect(
        &addr,
        ClientSettings {
            request_timeout_ms: 50,
            ..settings()
        },
    )
    .await
    .unwrap();

    let outcome = client.greet("nobody").unwrap().await;
    assert_eq!(outcome, Err(RpcFailure::Timeout));
    assert_eq!(client.channel().in_flight(), 0);
}

#[tokio::test]
async fn test_pending_calls_fail_when_peer_goes_away() {
    let (addr, hangup) = silent_peer().await;
    let client = TerraClient::connect(&addr, settings()).await.unwrap();

    let future = client.submit(&FlowBatch::new("j-lost", "u")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!future.is_done());

    drop(hangup);
    let outcome = tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("future resolves after hangup");
    assert!(matches!(outcome, Err(RpcFailure::ConnectionLost(_))));
}

#[tokio::test]
async fn test_closed_client_rejects_submission() {
    let controller = start_controller(
        Arc::new(AutoConfirm),
        Arc::new(RecordingExecutor::default()),
    )
    .await;
    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();
    client.shutdown().await;

    let result = client.submit(&FlowBatch::new("j-closed", "u"));
    assert!(matches!(result, Err(SubmissionError::ChannelClosed(_))));
    assert!(controller.store.for_job("j-closed").is_empty());
}

#[tokio::test]
async fn test_connect_refused() {
    // Bind then drop to find a port with nothing listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    assert!(TerraClient::connect(&addr, settings()).await.is_err());
}
