//! Provider call failures.

use std::time::Duration;

use dl_core::FailureKind;
use thiserror::Error;

/// Cancellations quicker than this point at a pre-flight problem (bad
/// settings, no connectivity) rather than a slow server.
pub const PREFLIGHT_THRESHOLD: Duration = Duration::from_secs(1);

/// Transport-level failure: no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("could not read the response body: {0}")]
    Body(String),
}

impl TransportError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        FailureKind::Network
    }
}

/// Who pulled the plug on a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The call's timeout elapsed.
    Timeout,
    /// The caller's cancel handle fired.
    Caller,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("invalid provider settings: {0}")]
    Config(String),
    #[error("network request failed: {0}")]
    Network(#[from] TransportError),
    #[error("{}", describe_cancel(.elapsed, .reason))]
    Cancelled { elapsed: Duration, reason: CancelReason },
    #[error("provider timed out (HTTP {status}); try again later")]
    ServerTimeout { status: u16 },
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

impl CallError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Config(_) => FailureKind::Configuration,
            Self::Network(_) => FailureKind::Network,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::ServerTimeout { .. } => FailureKind::ServerTimeout,
            Self::Http { .. } => FailureKind::Http,
            Self::EmptyCompletion => FailureKind::EmptyCompletion,
        }
    }
}

fn describe_cancel(elapsed: &Duration, reason: &CancelReason) -> String {
    if *elapsed < PREFLIGHT_THRESHOLD {
        return String::from(
            "request was cancelled before the provider answered; check the API key, base URL and network connection",
        );
    }
    match reason {
        CancelReason::Timeout => format!(
            "request timed out after {}s; slow reasoning models may need a shorter description",
            elapsed.as_secs()
        ),
        CancelReason::Caller => format!("request cancelled after {}s", elapsed.as_secs()),
    }
}
