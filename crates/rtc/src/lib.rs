//! The WebRTC transport: ICE candidate gathering, DTLS key exchange,
//! SDP offer/answer negotiation, SRTP encryption, and the RTP/RTCP
//! packet pipeline (jitter buffer, NACK, TWCC) that turns a negotiated
//! peer connection into publisher and subscriber sessions attached to
//! the routing core's source hub.
//!
//! Grounded on a real-time media engine's RTP/SRTP/ICE/DTLS
//! implementation, generalized from its proprietary signaling layer to
//! the standard WebRTC offer/answer + trickle-ICE flow this routing
//! core exposes over its HTTP control API.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod bridge;
pub mod connection;
pub mod dtls;
pub mod error;
pub mod h264_payload;
pub mod ice;
pub mod jitter_buffer;
pub mod nack;
pub mod rtcp;
pub mod rtp_handler;
pub mod sdp;
pub mod session;
pub mod srtp_pipeline;
pub mod twcc;

pub use bridge::{RtcToRtmp, RtmpToRtc, RtspToRtmp, SrtToRtc};
pub use connection::{ConnectionState, PeerConnection};
pub use dtls::{DtlsConnection, DtlsState};
pub use error::{RtcError, RtcResult};
pub use h264_payload::{H264PayloadHandler, NalUnit, NalUnitType};
pub use ice::{IceAgent, IceCandidate, IceCandidatePair, IceCandidateType, IceConnectionState, IcePairState};
pub use jitter_buffer::JitterBuffer;
pub use nack::{NackConfig, NackManager, NackMessage, NackStats};
pub use rtcp::{ReceiverReport, ReceptionReport, RtcpHeader, RtcpPacketType, SenderReport};
pub use rtp_handler::{is_audio, is_video, RtpHeader};
pub use sdp::{Attribute, Connection, MediaDescription, Origin, SessionDescription};
pub use session::{PublishSession, SubscribeSession};
pub use srtp_pipeline::{SrtpConfig, SrtpPipeline};
pub use twcc::{NetworkState, TwccEstimator};
