//! Shared error taxonomy for the media routing core.
//!
//! Every crate in the workspace wraps its own failures into one of these
//! kinds before they reach a session loop, so the loop can decide to
//! log-and-continue or abort without inspecting protocol-specific detail.

use thiserror::Error;

/// Top-level error kind, per the taxonomy in the streaming core design.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed frame, handshake failure, SDP parse failure. Surfaced to
    /// the peer and the session is closed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket failure, allocation failure, EMFILE. Aborts the session,
    /// worker stays alive.
    #[error("resource error: {0}")]
    Resource(String),

    /// Distinguished from other errors so idle sessions can be reaped
    /// silently rather than logged as failures.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Publish admission was refused.
    #[error("stream busy: {stream_url}")]
    StreamBusy { stream_url: String },

    /// A hook or security check rejected the action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Edge/relay mode disabled for this vhost.
    #[error("edge disabled for vhost {0}")]
    EdgeDisabled(String),

    /// Peer or server initiated a clean EOF. Logged at warn, not error.
    #[error("graceful close: {0}")]
    GracefulClose(String),

    /// DTLS auth failure, state machine corruption, invariant violation.
    /// The session is killed unconditionally.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The task's cancellation token was fired; every suspension point
    /// after that returns this.
    #[error("cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether this error should be logged at `warn` (expected, non-fatal)
    /// rather than `error` (something actually went wrong).
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            CoreError::GracefulClose(_) | CoreError::Timeout(_) | CoreError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_close_and_timeout_are_benign() {
        assert!(CoreError::GracefulClose("eof".into()).is_benign());
        assert!(CoreError::Timeout(std::time::Duration::from_secs(5)).is_benign());
        assert!(CoreError::Cancelled.is_benign());
    }

    #[test]
    fn protocol_errors_are_not_benign() {
        assert!(!CoreError::Protocol("bad chunk".into()).is_benign());
        assert!(!CoreError::Fatal("dtls auth failure".into()).is_benign());
    }
}
