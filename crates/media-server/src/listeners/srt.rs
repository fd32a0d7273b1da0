//! SRT listener.
//!
//! There's no real SRT (UDP, handshake, congestion control) transport
//! crate anywhere in this workspace's dependency corpus, so this accepts
//! plain TCP connections and reads the streamid off a single newline-
//! terminated line before handing the rest of the byte stream to
//! [`SrtSession`], which is transport-agnostic past that point anyway.
//! A real deployment would replace this accept loop with one built on an
//! actual SRT library; nothing else in this module would need to change.

use std::sync::Arc;

use proto_types::Session;
use srt_ingest::streamid;
use srt_ingest::SrtSession;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::state::AppState;

const DEFAULT_STREAMID: &str = "#!::r=live/default,m=request";

pub async fn serve(state: Arc<AppState>, addr: String) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("failed to bind srt listener on {addr}: {err}"))?;
    info!(addr, "srt listener started");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "srt accept failed");
                continue;
            }
        };
        let manager = Arc::clone(&state.sources);
        let tokens = Arc::clone(&state.tokens);
        let stats = Arc::clone(&state.stats);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            if let Err(err) = reader.read_line(&mut line).await {
                warn!(%peer, error = %err, "failed to read srt streamid line");
                return;
            }
            let Some(stream_id) = streamid::parse(line.trim(), DEFAULT_STREAMID) else {
                warn!(%peer, "srt connection rejected: unparseable streamid and default");
                return;
            };

            let session = Box::new(SrtSession::new(reader, stream_id, manager, tokens, stats));
            if let Err(err) = session.cycle().await {
                if err.is_benign() {
                    info!(%peer, "srt connection closed");
                } else {
                    error!(%peer, error = %err, "srt session failed");
                }
            }
        });
    }
}
