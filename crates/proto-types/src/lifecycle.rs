//! Capability-interface design for protocol adapters (RTMP/SRT/RTC/RTSP).
//!
//! Per SPEC_FULL.md §9: dynamic dispatch over protocols is modelled as a
//! trait per lifecycle stage plus a discriminated media-packet enum,
//! rather than a deep inheritance tree. Each protocol crate implements
//! these traits for its own listener/handshake/session types; `admission`
//! and `media-server` only ever hold `Box<dyn ...>`.

use crate::error::CoreResult;
use async_trait::async_trait;
use std::net::SocketAddr;

/// A bound listener that accepts raw connections and hands them to a
/// `Handshake` implementation. One per protocol endpoint.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Human-readable name for logging (`"rtmp"`, `"srt"`, ...).
    fn protocol(&self) -> &'static str;

    fn local_addr(&self) -> SocketAddr;
}

/// The protocol-specific handshake/negotiation stage, producing a
/// `Session` once complete.
#[async_trait]
pub trait Handshake: Send {
    async fn negotiate(self: Box<Self>) -> CoreResult<Box<dyn Session>>;
}

/// A live session: either a publisher or a subscriber, already attached
/// (or about to attach) to a `Source`. `cycle` runs until the session
/// ends, releasing every owned resource on any exit path.
#[async_trait]
pub trait Session: Send {
    async fn cycle(self: Box<Self>) -> CoreResult<()>;

    /// Request cooperative cancellation; the next suspension point inside
    /// `cycle` observes `CoreError::Cancelled`.
    fn interrupt(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeSession {
        interrupted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn cycle(self: Box<Self>) -> CoreResult<()> {
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(crate::error::CoreError::Cancelled);
            }
            Ok(())
        }

        fn interrupt(&self) {
            self.interrupted.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn interrupt_before_cycle_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let session: Box<dyn Session> = Box::new(FakeSession {
            interrupted: flag.clone(),
        });
        session.interrupt();
        let result = session.cycle().await;
        assert!(matches!(result, Err(crate::error::CoreError::Cancelled)));
    }
}
