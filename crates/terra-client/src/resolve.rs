//! Endpoint resolution. Fills in missing flow addresses from fallback tables.
//!
//! Explicit addresses on the record always win. A task id missing from its
//! table leaves the address `None` and logs a warning; it never fails the
//! flow or the batch it belongs to.

use std::collections::{BTreeMap, HashMap};

use terra_core::{Endpoint, FlowRecord};

/// Task id → network address.
pub trait AddressTable {
    fn lookup(&self, task_id: &str) -> Option<&str>;
}

impl AddressTable for HashMap<String, String> {
    fn lookup(&self, task_id: &str) -> Option<&str> {
        self.get(task_id).map(String::as_str)
    }
}

impl AddressTable for BTreeMap<String, String> {
    fn lookup(&self, task_id: &str) -> Option<&str> {
        self.get(task_id).map(String::as_str)
    }
}

/// A resolved flow plus the endpoints that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub flow: FlowRecord,
    pub unresolved: Vec<Endpoint>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolve both endpoints of `flow`. See [`resolve_detailed`].
pub fn resolve<M, R>(flow: FlowRecord, mappers: &M, reducers: &R) -> FlowRecord
where
    M: AddressTable + ?Sized,
    R: AddressTable + ?Sized,
{
    resolve_detailed(flow, mappers, reducers).flow
}

/// Resolve both endpoints of `flow` and report which ones stayed empty.
pub fn resolve_detailed<M, R>(mut flow: FlowRecord, mappers: &M, reducers: &R) -> Resolution
where
    M: AddressTable + ?Sized,
    R: AddressTable + ?Sized,
{
    let mut unresolved = Vec::new();

    if flow.source_address.is_none() {
        match mappers.lookup(&flow.source_task_id) {
            Some(addr) => flow.source_address = Some(addr.to_string()),
            None => {
                tracing::warn!(
                    task_id = %flow.source_task_id,
                    data_path = %flow.data_path,
                    "no mapper address for flow source"
                );
                unresolved.push(Endpoint::Source);
            }
        }
    }

    if flow.dest_address.is_none() {
        match reducers.lookup(&flow.dest_task_id) {
            Some(addr) => flow.dest_address = Some(addr.to_string()),
            None => {
                tracing::warn!(
                    task_id = %flow.dest_task_id,
                    data_path = %flow.data_path,
                    "no reducer address for flow destination"
                );
                unresolved.push(Endpoint::Destination);
            }
        }
    }

    Resolution { flow, unresolved }
}
