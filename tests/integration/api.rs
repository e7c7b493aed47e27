use std::sync::Arc;

use tokio::net::TcpListener;

use terra_api::ApiState;
use terra_client::TerraClient;
use terra_services::AutoConfirm;

use crate::*;

async fn start_api(controller: &Controller) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/api", listener.local_addr().unwrap());
    let app = terra_api::router(ApiState::new(controller.store.clone(), controller.addr.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test]
async fn test_status_api_reflects_dispatch() {
    let executor = Arc::new(RecordingExecutor::default());
    let controller = start_controller(Arc::new(AutoConfirm), executor).await;
    let base = start_api(&controller).await;

    let status: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["listen_addr"], controller.addr.as_str());
    assert_eq!(status["batches"]["total"], 0);

    let client = TerraClient::connect(&controller.addr, settings()).await.unwrap();
    let s = scenario("j-api", "/tmp/x/output/a.out");
    let reply = client
        .submit_shuffle_info("u", "j-api", &s.mappers, &s.reducers, &s.flows)
        .unwrap()
        .await
        .unwrap();
    let batch_id = reply.message.unwrap();
    wait_for_outcome(&controller.store, &batch_id).await;
    client.shutdown().await;

    let status: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["batches"]["total"], 1);
    assert_eq!(status["batches"]["dispatched"], 1);

    let list: serde_json::Value = reqwest::get(format!("{base}/batches?job=j-api"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["batches"][0]["batch_id"], batch_id.as_str());
    assert_eq!(list["batches"][0]["state"], "dispatched");
    assert_eq!(list["batches"][0]["outcome"]["kind"], "dispatched");

    let record: serde_json::Value = reqwest::get(format!("{base}/batches/{batch_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["batch"]["flows"][0]["dest_address"], "h2:2");

    let missing = reqwest::get(format!("{base}/batches/nope")).await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}
