//! Spins up one [`HlsSession`] per published stream.
//!
//! The source hub has no publish-notification hook (it's a pull table,
//! not an event bus), so this polls `SourceManager::active_sources` on a
//! [`Hourglass`] tick and starts a session the first time it sees a
//! stream with a publisher attached. This mirrors how `SrsHls` itself is
//! driven from `SrsOriginHub`'s per-packet callbacks, generalized here to
//! a coarse poll since nothing in this workspace emits that callback.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamrt::Hourglass;
use tracing::{error, info};

use crate::state::AppState;

const POLL_TICK: Duration = Duration::from_millis(500);

pub fn spawn(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let started: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut hourglass = Hourglass::new(POLL_TICK);
    hourglass.register(
        1,
        Arc::new(move || {
            let state = Arc::clone(&state);
            let started = Arc::clone(&started);
            for source in state.sources.active_sources() {
                if !source.has_publisher() {
                    continue;
                }
                let key = source.url.canonical_key();
                {
                    let mut guard = started.lock().unwrap();
                    if guard.contains(&key) {
                        continue;
                    }
                    guard.insert(key);
                }

                let config = state.config.hls.clone();
                let output_root = state.config.hls_path.clone();
                let hooks = Arc::clone(&state.hooks);
                let url = source.url.clone();
                let started_for_task = Arc::clone(&started);
                tokio::spawn(async move {
                    let mut session = hls_mux::HlsSession::new(url.clone(), config, &output_root, hooks);
                    info!(stream = %url, "hls packaging started");
                    if let Err(err) = session.run(&source).await {
                        error!(stream = %url, error = %err, "hls packaging stopped");
                    }
                    started_for_task.lock().unwrap().remove(&url.canonical_key());
                });
            }
        }),
    );
    hourglass.spawn()
}
