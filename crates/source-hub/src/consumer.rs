//! A bounded per-subscriber FIFO, grounded on the subscriber bookkeeping
//! in `stream_manager.rs`'s connection table: rather than pushing media
//! straight to a socket, the source hub hands each consumer its own
//! queue and lets the protocol session drain it at its own pace.

use std::collections::VecDeque;
use std::sync::Mutex;

use streamcfg::OverflowPolicy;
use tokio::sync::Notify;

use crate::item::MediaItem;

/// Why a dequeue attempt returned nothing.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    Closed,
}

struct Inner {
    queue: VecDeque<MediaItem>,
    closed: bool,
    paused: bool,
}

/// One subscriber's mailbox. Cheap to clone (an `Arc` internally would
/// be held by the owner); consumers are normally owned behind an `Arc`
/// by `Source` and handed out to the draining session as a reference.
pub struct Consumer {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    overflow_policy: OverflowPolicy,
}

impl Consumer {
    pub fn new(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Consumer {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
                paused: false,
            }),
            notify: Notify::new(),
            capacity,
            overflow_policy,
        }
    }

    /// Pause delivery (SPEC_FULL play-pause control): items are still
    /// accepted but `recv` blocks until resumed.
    pub fn set_paused(&self, paused: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.paused = paused;
        drop(inner);
        if !paused {
            self.notify.notify_waiters();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    /// Enqueue an item. Returns `true` if an item had to be dropped (or
    /// the consumer disconnected) to enforce `queue_length`.
    pub fn push(&self, item: MediaItem) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return true;
        }
        if inner.queue.len() >= self.capacity {
            match self.overflow_policy {
                OverflowPolicy::DropOldest => {
                    inner.queue.pop_front();
                    inner.queue.push_back(item);
                    drop(inner);
                    self.notify.notify_waiters();
                    return true;
                }
                OverflowPolicy::DisconnectSubscriber => {
                    inner.closed = true;
                    drop(inner);
                    self.notify.notify_waiters();
                    return true;
                }
            }
        }
        inner.queue.push_back(item);
        drop(inner);
        self.notify.notify_waiters();
        false
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for and pop the next item. Resolves immediately if one is
    /// already queued and the consumer isn't paused; otherwise awaits
    /// the next `push`/`set_paused(false)`/`close`.
    pub async fn recv(&self) -> Result<MediaItem, DrainOutcome> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if !inner.paused {
                    if let Some(item) = inner.queue.pop_front() {
                        return Ok(item);
                    }
                }
                if inner.closed {
                    return Err(DrainOutcome::Closed);
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto_types::{MediaKind, MediaPacket};
    use bytes::Bytes;

    fn item(dts: i64) -> MediaItem {
        MediaItem::Flv(MediaPacket::new(MediaKind::Video, dts, Bytes::from_static(&[0x27])))
    }

    #[tokio::test]
    async fn push_then_recv_fifo_order() {
        let c = Consumer::new(4, OverflowPolicy::DropOldest);
        c.push(item(1));
        c.push(item(2));
        let a = c.recv().await.unwrap();
        let b = c.recv().await.unwrap();
        assert_eq!(a.as_flv().unwrap().dts, 1);
        assert_eq!(b.as_flv().unwrap().dts, 2);
    }

    #[tokio::test]
    async fn drop_oldest_evicts_front_on_overflow() {
        let c = Consumer::new(2, OverflowPolicy::DropOldest);
        c.push(item(1));
        c.push(item(2));
        let dropped = c.push(item(3));
        assert!(dropped);
        assert_eq!(c.len(), 2);
        let first = c.recv().await.unwrap();
        assert_eq!(first.as_flv().unwrap().dts, 2);
    }

    #[tokio::test]
    async fn disconnect_subscriber_closes_on_overflow() {
        let c = Consumer::new(1, OverflowPolicy::DisconnectSubscriber);
        c.push(item(1));
        let dropped = c.push(item(2));
        assert!(dropped);
        assert!(c.is_closed());
    }

    #[tokio::test]
    async fn recv_blocks_until_pushed() {
        let c = std::sync::Arc::new(Consumer::new(4, OverflowPolicy::DropOldest));
        let c2 = c.clone();
        let handle = tokio::spawn(async move { c2.recv().await });
        tokio::task::yield_now().await;
        c.push(item(9));
        let got = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("recv should resolve once pushed")
            .unwrap()
            .unwrap();
        assert_eq!(got.as_flv().unwrap().dts, 9);
    }

    #[tokio::test]
    async fn paused_consumer_withholds_queued_items() {
        let c = Consumer::new(4, OverflowPolicy::DropOldest);
        c.push(item(1));
        c.set_paused(true);
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), c.recv()).await;
        assert!(result.is_err(), "recv should not resolve while paused");
        c.set_paused(false);
        let item = c.recv().await.unwrap();
        assert_eq!(item.as_flv().unwrap().dts, 1);
    }

    #[tokio::test]
    async fn closed_empty_consumer_reports_closed() {
        let c = Consumer::new(4, OverflowPolicy::DropOldest);
        c.close();
        assert_eq!(c.recv().await.unwrap_err(), DrainOutcome::Closed);
    }
}
