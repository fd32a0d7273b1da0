//! RTMP TCP listener: accepts connections and hands each one to a fresh
//! [`RtmpSession`], matching the accept-loop shape every protocol
//! listener in this binary follows.

use std::sync::Arc;

use proto_types::Session;
use rtmp::RtmpSession;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::state::AppState;

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.listen.rtmp.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("failed to bind rtmp listener on {addr}: {err}"))?;
    info!(addr, "rtmp listener started");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "rtmp accept failed");
                continue;
            }
        };
        let manager = Arc::clone(&state.sources);
        let tokens = Arc::clone(&state.tokens);
        let stats = Arc::clone(&state.stats);
        tokio::spawn(async move {
            let session = Box::new(RtmpSession::new(stream, manager, tokens, stats));
            if let Err(err) = session.cycle().await {
                if err.is_benign() {
                    info!(%peer, "rtmp connection closed");
                } else {
                    error!(%peer, error = %err, "rtmp session failed");
                }
            }
        });
    }
}
