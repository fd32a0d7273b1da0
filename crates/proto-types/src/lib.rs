//! Shared types for the media routing core: the canonical stream URL,
//! the FLV/RTMP media packet envelope, track descriptions, the error
//! taxonomy, outbound hook payloads, and the listener/handshake/session
//! capability traits used for dynamic dispatch over protocol adapters.

pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod packet;
pub mod rtp_envelope;
pub mod stream_url;
pub mod track;

pub use error::{CoreError, CoreResult};
pub use hooks::{HookAction, HookPayload, HookResponse};
pub use lifecycle::{Handshake, Listener, Session};
pub use packet::{MediaKind, MediaPacket};
pub use rtp_envelope::RtpEnvelope;
pub use stream_url::StreamUrl;
pub use track::{Codec, Direction, TrackDescription};

