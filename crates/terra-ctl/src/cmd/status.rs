//! Controller status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    listen_addr: String,
    uptime_secs: u64,
    batches: BatchCounts,
}

#[derive(Deserialize)]
struct BatchCounts {
    total: usize,
    awaiting_decision: usize,
    dispatched: usize,
    failed: usize,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Terra Controller Status");
    println!("═══════════════════════════════════════");
    println!("  RPC address       : {}", resp.listen_addr);
    println!("  Uptime            : {}s", resp.uptime_secs);
    println!("  Batches received  : {}", resp.batches.total);
    println!("  Awaiting decision : {}", resp.batches.awaiting_decision);
    println!("  Dispatched        : {}", resp.batches.dispatched);
    println!("  Failed            : {}", resp.batches.failed);

    Ok(())
}
