//! Batch listing and inspection.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct BatchesResponse {
    batches: Vec<BatchSummary>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct BatchSummary {
    batch_id: String,
    job_id: String,
    submitter: String,
    flows: usize,
    total_bytes: u64,
    unresolved: usize,
    state: String,
    outcome: Option<serde_json::Value>,
    received_at: u64,
    updated_at: u64,
}

fn outcome_label(outcome: &Option<serde_json::Value>) -> String {
    let Some(outcome) = outcome else {
        return "pending".to_string();
    };
    let kind = outcome["kind"].as_str().unwrap_or("unknown");
    match outcome["reason"].as_str() {
        Some(reason) => format!("{kind} ({reason})"),
        None => kind.to_string(),
    }
}

pub async fn cmd_batches(port: u16, job: Option<&str>) -> Result<()> {
    let url = match job {
        Some(job) => format!("{}/batches?job={}", base_url(port), job),
        None => format!("{}/batches", base_url(port)),
    };
    let resp: BatchesResponse = get_json(&url).await?;

    if resp.batches.is_empty() {
        println!("No batches received.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Batches ({})", resp.batches.len());
    println!("═══════════════════════════════════════");

    for b in &resp.batches {
        println!("  ┌─ {}", &b.batch_id[..16.min(b.batch_id.len())]);
        println!("  │  job       : {}", b.job_id);
        println!("  │  submitter : {}", b.submitter);
        println!("  │  flows     : {} ({} unresolved)", b.flows, b.unresolved);
        println!("  │  bytes     : {}", b.total_bytes);
        println!("  │  state     : {}", b.state);
        println!("  └─ outcome   : {}", outcome_label(&b.outcome));
    }

    Ok(())
}

pub async fn cmd_batch(port: u16, id: &str) -> Result<()> {
    let record: serde_json::Value =
        get_json(&format!("{}/batches/{}", base_url(port), id)).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome_label(&None), "pending");
        assert_eq!(
            outcome_label(&Some(serde_json::json!({"kind": "dispatched"}))),
            "dispatched"
        );
        assert_eq!(
            outcome_label(&Some(
                serde_json::json!({"kind": "confirmation_unavailable", "reason": "stdin closed"})
            )),
            "confirmation_unavailable (stdin closed)"
        );
    }
}
