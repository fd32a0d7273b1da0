//! The process-wide table of live `Source`s, grounded on
//! `stream_manager.rs`'s `StreamManager`: keyed by canonical stream URL,
//! created lazily on first publish or subscribe, and disposed after a
//! grace window once a source has neither a publisher nor consumers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proto_types::StreamUrl;
use streamcfg::SourceConfig;
use tracing::debug;

use crate::source::Source;

pub struct SourceManager {
    sources: Mutex<HashMap<String, Arc<Source>>>,
    config: SourceConfig,
}

impl SourceManager {
    pub fn new(config: SourceConfig) -> Arc<Self> {
        Arc::new(SourceManager {
            sources: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub fn fetch(&self, url: &StreamUrl) -> Option<Arc<Source>> {
        self.sources.lock().unwrap().get(&url.canonical_key()).cloned()
    }

    /// Look up a source, creating it if this is the first publisher or
    /// subscriber to reference it.
    pub fn fetch_or_create(self: &Arc<Self>, url: &StreamUrl) -> Arc<Source> {
        let mut sources = self.sources.lock().unwrap();
        sources
            .entry(url.canonical_key())
            .or_insert_with(|| Arc::new(Source::new(url.clone(), self.config.clone())))
            .clone()
    }

    /// Called after a publisher detaches or a consumer is dropped: if the
    /// source is now idle, schedule its removal after `grace_window`
    /// unless it gets a new publisher or consumer in the meantime.
    pub fn schedule_disposal_check(self: &Arc<Self>, url: StreamUrl) {
        let grace_window = self.config.grace_window;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace_window).await;
            this.dispose_if_idle(&url);
        });
    }

    fn dispose_if_idle(&self, url: &StreamUrl) {
        let mut sources = self.sources.lock().unwrap();
        if let Some(source) = sources.get(&url.canonical_key()) {
            if !source.has_publisher() && source.consumer_count() == 0 {
                sources.remove(&url.canonical_key());
                debug!(stream = %url, "source disposed after grace window");
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    /// Snapshot of every currently-tracked source, for callers (e.g. the
    /// HLS packager) that poll for new publishers rather than being
    /// notified of them directly.
    pub fn active_sources(&self) -> Vec<Arc<Source>> {
        self.sources.lock().unwrap().values().cloned().collect()
    }

    pub fn grace_window(&self) -> Duration {
        self.config.grace_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> StreamUrl {
        StreamUrl::new("__defaultVhost__", "live", "test")
    }

    #[test]
    fn fetch_or_create_is_idempotent() {
        let mgr = SourceManager::new(SourceConfig::default());
        let a = mgr.fetch_or_create(&url());
        let b = mgr.fetch_or_create(&url());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mgr.active_count(), 1);
    }

    #[test]
    fn active_sources_reflects_the_table() {
        let mgr = SourceManager::new(SourceConfig::default());
        mgr.fetch_or_create(&url());
        assert_eq!(mgr.active_sources().len(), 1);
    }

    #[test]
    fn fetch_returns_none_for_unknown_stream() {
        let mgr = SourceManager::new(SourceConfig::default());
        assert!(mgr.fetch(&url()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_source_is_disposed_after_grace_window() {
        let mut cfg = SourceConfig::default();
        cfg.grace_window = Duration::from_secs(1);
        let mgr = SourceManager::new(cfg);
        let _source = mgr.fetch_or_create(&url());
        assert_eq!(mgr.active_count(), 1);

        mgr.schedule_disposal_check(url());
        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn republish_before_grace_window_elapses_keeps_source() {
        let mut cfg = SourceConfig::default();
        cfg.grace_window = Duration::from_secs(5);
        let mgr = SourceManager::new(cfg);
        let source = mgr.fetch_or_create(&url());
        mgr.schedule_disposal_check(url());

        tokio::time::advance(Duration::from_secs(1)).await;
        source.on_publish();

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;

        assert_eq!(mgr.active_count(), 1);
    }
}
