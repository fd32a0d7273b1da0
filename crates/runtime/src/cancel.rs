//! Cancellation: every task exposes `interrupt()`. After interruption,
//! every subsequent suspension point (`sleep`, `recv`, `wait`) returns a
//! cancellation error; the task is expected to unwind and release its
//! resources via scoped acquisition (RAII guards in owning structs).

use proto_types::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A cooperative cancellation handle shared between a session's owner
/// (who calls `interrupt()`) and the session's coroutine (who checks
/// `is_interrupted()` / awaits `cancelled()` at suspension points).
#[derive(Clone)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Interrupt {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve a suspension point: if already interrupted, fail
    /// immediately; otherwise race the interrupt signal against a
    /// future produced by the caller.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, CoreError>
    where
        F: std::future::Future<Output = T>,
    {
        if self.is_interrupted() {
            return Err(CoreError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.notify.notified(), if !self.is_interrupted() => Err(CoreError::Cancelled),
            out = fut => {
                if self.is_interrupted() {
                    Err(CoreError::Cancelled)
                } else {
                    Ok(out)
                }
            }
        }
    }

    /// A cancellable sleep: one of the canonical "may suspend" points.
    pub async fn sleep(&self, dur: Duration) -> Result<(), CoreError> {
        self.guard(tokio::time::sleep(dur)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_passes_through_when_not_interrupted() {
        let i = Interrupt::new();
        let out = i.guard(async { 7 }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn guard_fails_immediately_once_interrupted() {
        let i = Interrupt::new();
        i.interrupt();
        let out = i.guard(async { 7 }).await;
        assert!(matches!(out, Err(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn interrupt_wakes_a_pending_sleep() {
        let i = Interrupt::new();
        let i2 = i.clone();
        let handle = tokio::spawn(async move { i2.sleep(Duration::from_secs(3600)).await });
        tokio::task::yield_now().await;
        i.interrupt();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should finish promptly after interrupt")
            .unwrap();
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
