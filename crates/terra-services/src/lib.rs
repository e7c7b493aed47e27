pub mod batch_store;
pub mod controller;
pub mod dispatch;
pub mod executor;
pub mod gate;
pub mod server;
pub mod service;

pub use batch_store::{Admission, BatchCounts, BatchRecord, BatchStore};
pub use controller::ControllerService;
pub use dispatch::{
    output_dir, DispatchError, DispatchOutcome, DispatchState, DispatchStub, TransferDirective,
};
pub use executor::{LogOnlyExecutor, ScpExecutor, TransferExecutor};
pub use gate::{AutoConfirm, ConfirmationGate, ConfirmationUnavailable, SignalGate, StdinGate};
pub use server::RpcServer;
pub use service::ShuffleService;
