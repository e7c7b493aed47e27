//! Gate and executor selection from config.

use std::sync::Arc;

use terra_core::config::{ConfirmationKind, DispatchSettings, ExecutorKind};
use terra_services::{
    AutoConfirm, ConfirmationGate, DispatchStub, LogOnlyExecutor, ScpExecutor, StdinGate,
    TransferExecutor,
};

pub fn gate(kind: ConfirmationKind) -> Arc<dyn ConfirmationGate> {
    match kind {
        ConfirmationKind::Stdin => Arc::new(StdinGate::new()),
        ConfirmationKind::Auto => {
            tracing::warn!("auto-confirm enabled — transfers start without operator input");
            Arc::new(AutoConfirm)
        }
    }
}

pub fn executor(kind: ExecutorKind) -> Arc<dyn TransferExecutor> {
    match kind {
        ExecutorKind::Scp => Arc::new(ScpExecutor::new()),
        ExecutorKind::LogOnly => Arc::new(LogOnlyExecutor),
    }
}

pub fn dispatch_stub(settings: &DispatchSettings) -> DispatchStub {
    tracing::info!(
        confirmation = ?settings.confirmation,
        executor = ?settings.executor,
        output_marker = %settings.output_marker,
        "dispatch configured"
    );
    DispatchStub::new(
        gate(settings.confirmation),
        executor(settings.executor),
        settings.output_marker.clone(),
    )
}
