//! Publish-token arbitration, grounded on SPEC_FULL §4.5: a process-wide
//! registry keyed by canonical stream URL is the only mechanism that
//! coordinates cross-protocol publishing. An RTMP publisher and a
//! WHIP/RTC publisher racing for the same URL resolve through this
//! single map, not through per-protocol locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use proto_types::{CoreError, CoreResult, StreamUrl};

#[derive(Debug)]
struct Inner {
    held: HashMap<String, String>,
}

/// The process-wide map from canonical stream URL to the holding
/// publisher's connection id.
#[derive(Debug)]
pub struct PublishTokenRegistry {
    inner: Mutex<Inner>,
}

impl PublishTokenRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(PublishTokenRegistry {
            inner: Mutex::new(Inner { held: HashMap::new() }),
        })
    }

    /// Acquire the publish right for `url` on behalf of `publisher_cid`.
    /// Returns `StreamBusy` if another publisher already holds it.
    pub fn acquire(self: &Arc<Self>, url: &StreamUrl, publisher_cid: impl Into<String>) -> CoreResult<PublishToken> {
        let key = url.canonical_key();
        let mut inner = self.inner.lock().unwrap();
        if inner.held.contains_key(&key) {
            return Err(CoreError::StreamBusy { stream_url: key });
        }
        inner.held.insert(key.clone(), publisher_cid.into());
        Ok(PublishToken {
            registry: Arc::clone(self),
            key,
        })
    }

    pub fn is_held(&self, url: &StreamUrl) -> bool {
        self.inner.lock().unwrap().held.contains_key(&url.canonical_key())
    }

    fn release(&self, key: &str) {
        self.inner.lock().unwrap().held.remove(key);
    }
}

/// RAII handle to an acquired publish right: dropping it (session end,
/// any exit path) releases the URL for the next publisher.
#[derive(Debug)]
pub struct PublishToken {
    registry: Arc<PublishTokenRegistry>,
    key: String,
}

impl Drop for PublishToken {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

impl PublishToken {
    pub fn stream_key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> StreamUrl {
        StreamUrl::new("v", "live", "bar")
    }

    #[test]
    fn second_acquire_on_same_url_is_busy() {
        let registry = PublishTokenRegistry::new();
        let _first = registry.acquire(&url(), "cid-1").unwrap();
        let err = registry.acquire(&url(), "cid-2").unwrap_err();
        assert!(matches!(err, CoreError::StreamBusy { .. }));
    }

    #[test]
    fn dropping_token_releases_url_for_next_publisher() {
        let registry = PublishTokenRegistry::new();
        {
            let _first = registry.acquire(&url(), "cid-1").unwrap();
            assert!(registry.is_held(&url()));
        }
        assert!(!registry.is_held(&url()));
        let second = registry.acquire(&url(), "cid-2");
        assert!(second.is_ok());
    }
}
