//! terra-client — the orchestrator side of shuffle-info submission.
//!
//! Resolve flow endpoints, aggregate them into a batch, and submit the batch
//! to the controller over a shared RPC channel. Every call returns a
//! [`ResolvedFuture`] straight away.

pub mod aggregate;
pub mod channel;
pub mod client;
pub mod error;
pub mod future;
pub mod resolve;


pub use aggregate::aggregate;
pub use channel::Channel;
pub use client::TerraClient;
pub use error::{ChannelError, RpcFailure, SubmissionError};
pub use future::{pair, Completer, ResolvedFuture};
pub use resolve::{resolve, resolve_detailed, AddressTable, Resolution};
