//! Client-side error types.

use terra_core::wire::ErrorCode;

/// The transport refused a call before it was sent. No future exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("channel to {0} is closed")]
    ChannelClosed(String),

    #[error("outbound queue to {0} is full")]
    QueueFull(String),

    #[error("request could not be encoded: {0}")]
    Malformed(String),
}

/// An issued call failed. Delivered through the future.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcFailure {
    #[error("controller returned {code:?}: {message}")]
    Status { code: ErrorCode, message: String },

    #[error("no reply before the deadline")]
    Timeout,

    #[error("call was cancelled")]
    Cancelled,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("malformed reply: {0}")]
    Protocol(String),
}

/// Opening a channel failed.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("failed to connect to {0}: {1}")]
    Connect(String, std::io::Error),
}
