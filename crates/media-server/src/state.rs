//! Process-wide handles shared across every listener and the HTTP
//! control API, grounded on `notification-worker::main`'s shape of
//! constructing its dependencies once and handing `Arc` clones to each
//! spawned task.

use std::sync::Arc;

use admission::{HookClient, PublishTokenRegistry, StatsRegistry};
use source_hub::SourceManager;
use streamcfg::AppConfig;

pub struct AppState {
    pub config: AppConfig,
    pub sources: Arc<SourceManager>,
    pub tokens: Arc<PublishTokenRegistry>,
    pub stats: Arc<StatsRegistry>,
    pub hooks: Arc<HookClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let sources = SourceManager::new(config.source.clone());
        let tokens = PublishTokenRegistry::new();
        let stats = Arc::new(StatsRegistry::new());
        let hooks = Arc::new(HookClient::new(config.hooks.clone()));
        Arc::new(AppState {
            config,
            sources,
            tokens,
            stats,
            hooks,
        })
    }
}
