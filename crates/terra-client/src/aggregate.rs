//! Batch aggregation: fold keyed flow records into one `FlowBatch`.

use terra_core::{FlowBatch, FlowRecord};

use crate::resolve::{resolve_detailed, AddressTable};

/// Build a batch from `flows_by_key`, resolving each flow on the way in.
///
/// Flows keep the iteration order of the input mapping. Keys are unique in
/// any map type, so two inserts under one key have already collapsed to the
/// last one before this is called. Unresolved endpoints are logged, not
/// rejected.
pub fn aggregate<'a, K, I, M, R>(
    job_id: &str,
    submitter: &str,
    flows_by_key: I,
    mappers: &M,
    reducers: &R,
) -> FlowBatch
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, &'a FlowRecord)>,
    M: AddressTable + ?Sized,
    R: AddressTable + ?Sized,
{
    let mut batch = FlowBatch::new(job_id, submitter);
    let mut unresolved_flows = 0usize;

    for (key, flow) in flows_by_key {
        let resolution = resolve_detailed(flow.clone(), mappers, reducers);
        if !resolution.is_complete() {
            unresolved_flows += 1;
            tracing::debug!(
                key = key.as_ref(),
                unresolved = ?resolution.unresolved,
                "flow added with unresolved endpoints"
            );
        }
        batch.flows.push(resolution.flow);
    }

    tracing::info!(
        job_id,
        submitter,
        flows = batch.flows.len(),
        unresolved_flows,
        total_bytes = batch.total_bytes(),
        "shuffle batch aggregated"
    );

    batch
}
