//! Read-only watch of the `-g` signal file. Per the CLI contract, this
//! process never acts on the file's contents or reloads anything from
//! it; it only logs when the file changes so an operator can confirm
//! their external tooling is writing where this process is looking.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn spawn(path: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_modified = std::fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "signal file unreadable");
                    continue;
                }
            };
            let modified = metadata.modified().ok();
            if modified != last_modified {
                debug!(path = %path.display(), "signal file changed (watch-only, no action taken)");
                last_modified = modified;
            }
        }
    })
}
