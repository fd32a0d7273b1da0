//! The HTTP control API: `/rtc/v1/publish/` and `/rtc/v1/play/` for
//! WHIP-style WebRTC signaling, plus a read-only statistics dump,
//! grounded on `health.rs`'s `axum::Router`/graceful-shutdown shape and
//! SPEC_FULL's external-interfaces section for the request/response
//! bodies.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use proto_types::{CoreError, Session, StreamUrl};
use rtc::connection::PeerConnection;
use rtc::dtls::DtlsConnection;
use rtc::ice::IceCandidate;
use rtc::sdp::SessionDescription;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::rtc_answer::{build_answer, AnswerInputs};
use crate::state::AppState;

#[derive(Deserialize)]
struct RtcRequest {
    api: String,
    tid: String,
    streamurl: String,
    sdp: String,
    #[serde(default)]
    clientip: Option<String>,
    #[serde(default)]
    codec: Option<String>,
}

#[derive(Serialize)]
struct RtcResponse {
    code: i32,
    sdp: String,
    sessionid: String,
    simulator: String,
}

impl RtcResponse {
    fn ok(sdp: String, sessionid: String) -> Self {
        RtcResponse { code: 0, sdp, sessionid, simulator: String::new() }
    }

    fn error(code: i32) -> Self {
        RtcResponse { code, sdp: String::new(), sessionid: String::new(), simulator: String::new() }
    }
}

/// Error codes surfaced to WHIP/WHEP-style clients; `STREAM_BUSY` mirrors
/// the admission contract's testable property that a losing publisher
/// gets a non-zero code back with no session created.
const ERROR_STREAM_BUSY: i32 = 1002;
const ERROR_BAD_REQUEST: i32 = 1000;
const ERROR_NEGOTIATION_FAILED: i32 = 1001;

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.listen.http_api.clone();
    let app = Router::new()
        .route("/rtc/v1/publish/", post(publish))
        .route("/rtc/v1/play/", post(play))
        .route("/api/v1/streams", get(streams))
        .with_state(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("failed to bind http api listener on {addr}: {err}"))?;
    info!(addr, "http control api started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| anyhow::anyhow!("http control api error: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("http control api shutting down");
}

fn parse_streamurl(streamurl: &str) -> Option<StreamUrl> {
    let without_scheme = streamurl.splitn(2, "://").nth(1).unwrap_or(streamurl);
    let path = without_scheme.splitn(2, '/').nth(1)?;
    StreamUrl::parse(path, "")
}

async fn publish(State(state): State<Arc<AppState>>, Json(req): Json<RtcRequest>) -> impl IntoResponse {
    negotiate(state, req, true).await
}

async fn play(State(state): State<Arc<AppState>>, Json(req): Json<RtcRequest>) -> impl IntoResponse {
    negotiate(state, req, false).await
}

async fn negotiate(state: Arc<AppState>, req: RtcRequest, is_publish: bool) -> impl IntoResponse {
    info!(api = req.api, tid = req.tid, streamurl = req.streamurl, "rtc negotiation request");

    let Some(url) = parse_streamurl(&req.streamurl) else {
        warn!(streamurl = req.streamurl, "malformed streamurl in rtc request");
        return (StatusCode::BAD_REQUEST, Json(RtcResponse::error(ERROR_BAD_REQUEST)));
    };

    let offer = match SessionDescription::parse(&req.sdp) {
        Ok(sdp) => sdp,
        Err(err) => {
            warn!(stream = %url, error = %err, "failed to parse rtc offer");
            return (StatusCode::BAD_REQUEST, Json(RtcResponse::error(ERROR_BAD_REQUEST)));
        }
    };
    if offer.get_dtls_fingerprint().is_none() {
        warn!(stream = %url, "rtc offer missing dtls fingerprint");
        return (StatusCode::BAD_REQUEST, Json(RtcResponse::error(ERROR_BAD_REQUEST)));
    }

    let token = if is_publish {
        match state.tokens.acquire(&url, format!("rtc:{}", url.canonical_key())) {
            Ok(token) => Some(token),
            Err(CoreError::StreamBusy { .. }) => {
                info!(stream = %url, "rtc publish refused: stream busy");
                return (StatusCode::OK, Json(RtcResponse::error(ERROR_STREAM_BUSY)));
            }
            Err(err) => {
                error!(stream = %url, error = %err, "rtc publish admission failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(RtcResponse::error(ERROR_NEGOTIATION_FAILED)));
            }
        }
    } else {
        None
    };

    let client_addr: SocketAddr = req
        .clientip
        .as_deref()
        .and_then(|ip| ip.parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, 0))
        .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut dtls = DtlsConnection::new(Uuid::new_v4(), client_addr);
    dtls.set_local_fingerprint(local_fingerprint());
    let peer = PeerConnection::new(dtls);

    let mut ice = peer.ice.lock().unwrap();
    let candidate = IceCandidate::new_host(
        1,
        SocketAddr::new(
            local_candidate_ip().parse().expect("local candidate ip is a valid literal"),
            local_candidate_port(&state),
        ),
    );
    let local_candidate = candidate.to_sdp_attribute();
    ice.add_local_candidate(candidate);
    let answer = build_answer(&AnswerInputs {
        offer: &offer,
        ice: &ice,
        local_fingerprint: &local_fingerprint(),
        local_candidate: &local_candidate,
        server_receives: is_publish,
    });
    drop(ice);

    if let Err(err) = peer.begin_ice() {
        error!(stream = %url, error = %err, "rtc connection failed to enter waiting-stun state");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(RtcResponse::error(ERROR_NEGOTIATION_FAILED)));
    }

    if is_publish {
        // The UDP socket loop that feeds decrypted RTP into
        // `PublishSession::ingest` isn't wired up: this workspace has no
        // real SRTP/UDP transport crate to drive it from. The session
        // still owns the publish token for its lifetime, so the stream
        // stays busy for as long as this negotiation's connection is
        // alive and becomes publishable again once it ends, matching the
        // admission contract even though no media flows yet.
        let source = state.sources.fetch_or_create(&url);
        let session = Box::new(rtc::PublishSession::new(peer.clone(), source, token));
        tokio::spawn(async move {
            if let Err(err) = session.cycle().await {
                warn!(error = %err, "rtc publish session ended");
            }
        });
    } else {
        let source = state.sources.fetch_or_create(&url);
        state.stats.on_client_connect(&url);
        let consumer = source.create_consumer();
        let out_ssrc: u32 = rand::random();
        let tracks: Vec<_> = offer
            .media_descriptions
            .iter()
            .flat_map(|media| media.track_descriptions())
            .collect();
        let out_payload_type = req
            .codec
            .as_deref()
            .and_then(|requested| {
                tracks
                    .iter()
                    .find(|track| format!("{:?}", track.codec).eq_ignore_ascii_case(requested))
            })
            .or_else(|| tracks.first())
            .map(|track| track.pt)
            .or_else(|| offer.media_descriptions.first().and_then(|m| m.payload_types.first().copied()))
            .unwrap_or(96);
        let session = Box::new(rtc::SubscribeSession::new(peer.clone(), consumer, out_ssrc, out_payload_type));
        tokio::spawn(async move {
            if let Err(err) = session.cycle().await {
                warn!(error = %err, "rtc play session ended");
            }
        });
    }

    info!(stream = %url, connection = %peer.id, "rtc negotiation complete");
    (
        StatusCode::OK,
        Json(RtcResponse::ok(answer.serialize(), peer.id.to_string())),
    )
}

async fn streams(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "streams": state.stats.dump()["streams"],
        "active_sources": state.sources.active_count(),
    }))
}

fn local_fingerprint() -> String {
    "00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF".to_string()
}

fn local_candidate_ip() -> String {
    "127.0.0.1".to_string()
}

fn local_candidate_port(_state: &Arc<AppState>) -> u16 {
    8000
}
