//! Terra integration test harness.
//!
//! Every test runs a real controller (RPC server + dispatch) on a loopback
//! port and talks to it through `TerraClient`. No external processes are
//! spawned; the transfer executor records its calls instead of copying.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use terra_core::config::ClientSettings;
use terra_core::{FlowKey, FlowRecord};
use terra_services::{
    BatchStore, ConfirmationGate, ControllerService, DispatchOutcome, DispatchStub, RpcServer,
    TransferExecutor,
};

mod api;
mod dispatch;
mod rpc;
mod scenario;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A controller running on 127.0.0.1. Shuts down when dropped.
pub struct Controller {
    pub addr: String,
    pub store: BatchStore,
    shutdown: broadcast::Sender<()>,
}

impl Drop for Controller {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

pub async fn start_controller(
    gate: Arc<dyn ConfirmationGate>,
    executor: Arc<dyn TransferExecutor>,
) -> Controller {
    let store = BatchStore::new();
    let service = Arc::new(ControllerService::new(
        store.clone(),
        DispatchStub::new(gate, executor, "output"),
    ));
    let (shutdown, rx) = broadcast::channel(1);
    let server = RpcServer::bind("127.0.0.1:0", service, rx)
        .await
        .expect("bind loopback");
    let addr = server.local_addr().expect("bound address").to_string();
    tokio::spawn(server.run());
    Controller {
        addr,
        store,
        shutdown,
    }
}

/// Client settings with a short shutdown grace so tests finish quickly.
pub fn settings() -> ClientSettings {
    ClientSettings {
        shutdown_grace_ms: 200,
        ..ClientSettings::default()
    }
}

/// Executor that records `(source_path, destination_address)` per call.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferExecutor for RecordingExecutor {
    async fn execute(&self, source_path: &str, destination_address: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((source_path.to_string(), destination_address.to_string()));
        Ok(())
    }
}

/// Poll the store until the batch's dispatch has finished.
pub async fn wait_for_outcome(store: &BatchStore, batch_id: &str) -> DispatchOutcome {
    for _ in 0..400 {
        if let Some(outcome) = store.get(batch_id).and_then(|r| r.outcome) {
            return outcome;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("dispatch of {batch_id} did not finish");
}

/// The canonical one-flow job: M1 on h1:1 shuffles to R1 on h2:2.
pub struct Scenario {
    pub mappers: HashMap<String, String>,
    pub reducers: HashMap<String, String>,
    pub flows: BTreeMap<String, FlowRecord>,
}

pub fn scenario(job_id: &str, data_path: &str) -> Scenario {
    let mappers = [("M1".to_string(), "h1:1".to_string())].into_iter().collect();
    let reducers = [("R1".to_string(), "h2:2".to_string())].into_iter().collect();
    let mut flows = BTreeMap::new();
    flows.insert(
        FlowKey::new("u", job_id, "M1", "R1").into_string(),
        FlowRecord::new("M1", "R1", data_path, 0, 500),
    );
    Scenario {
        mappers,
        reducers,
        flows,
    }
}
