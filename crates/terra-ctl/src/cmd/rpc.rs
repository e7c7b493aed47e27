//! Commands that talk to the controller's RPC port directly.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use terra_client::TerraClient;
use terra_core::config::ClientSettings;
use terra_core::{FlowKey, FlowRecord, SubmissionReply};

/// `submit` input: everything `submit_shuffle_info` takes.
#[derive(Debug, Deserialize)]
pub struct SubmissionFile {
    pub user: String,
    pub job_id: String,
    #[serde(default)]
    pub mappers: HashMap<String, String>,
    #[serde(default)]
    pub reducers: HashMap<String, String>,
    /// Keyed flows, conventionally `user:job:map:reduce`.
    pub flows: BTreeMap<String, FlowRecord>,
}

impl SubmissionFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// The fixed sample submission: one 500-byte flow from M1 to R1.
    pub fn demo() -> Self {
        let mappers: HashMap<String, String> =
            [("M1".to_string(), "maxi1".to_string())].into_iter().collect();
        let reducers: HashMap<String, String> =
            [("R1".to_string(), "maxi2".to_string())].into_iter().collect();
        let mut flows = BTreeMap::new();
        flows.insert(
            FlowKey::new("user", "job", "map", "reduce").into_string(),
            FlowRecord::new("M1", "R1", "/tmp/file/output/ddd/file.out", 0, 500)
                .with_source_address("maxi1")
                .with_dest_address("maxi2"),
        );
        Self {
            user: "x".to_string(),
            job_id: "y".to_string(),
            mappers,
            reducers,
            flows,
        }
    }
}

async fn connect(settings: ClientSettings) -> Result<TerraClient> {
    let addr = settings.controller_addr.clone();
    TerraClient::connect(&addr, settings)
        .await
        .with_context(|| format!("failed to connect to controller at {} — is terrad running?", addr))
}

pub async fn cmd_greet(settings: ClientSettings, name: &str) -> Result<()> {
    let client = connect(settings).await?;
    let reply = client.greet(name)?.await;
    client.shutdown().await;
    println!("Greeting: {}", reply?.message);
    Ok(())
}

pub async fn cmd_submit(settings: ClientSettings, submission: SubmissionFile) -> Result<()> {
    let client = connect(settings).await?;
    let future = client.submit_shuffle_info(
        &submission.user,
        &submission.job_id,
        &submission.mappers,
        &submission.reducers,
        &submission.flows,
    )?;
    let reply = future.await;
    client.shutdown().await;
    print_reply(&submission, reply?)
}

fn print_reply(submission: &SubmissionFile, reply: SubmissionReply) -> Result<()> {
    let message = reply.message.unwrap_or_default();
    if !reply.accepted {
        bail!("controller rejected job {}: {}", submission.job_id, message);
    }
    println!("═══════════════════════════════════════");
    println!("  Shuffle Info Submitted");
    println!("═══════════════════════════════════════");
    println!("  Job       : {}", submission.job_id);
    println!("  User      : {}", submission.user);
    println!("  Flows     : {}", submission.flows.len());
    println!("  Batch id  : {}", message);
    Ok(())
}
