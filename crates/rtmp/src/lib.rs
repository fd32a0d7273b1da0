//! RTMP ingress/egress: the plain handshake, chunk stream assembly, AMF0
//! command dispatch, and the publish/play session loop wired to the
//! shared source hub and publish-token registry.
//!
//! Grounded on the connection-handling shape in a real-time media
//! engine's session bookkeeping, generalized from that engine's RTC
//! sessions to RTMP's handshake/chunk/command flow (RFC-less but
//! widely-deployed; the canonical reference is Adobe's RTMP
//! specification).

pub mod amf0;
pub mod chunk;
pub mod handshake;
pub mod session;

pub use amf0::{Amf0Value, Command};
pub use chunk::{ChunkAssembler, RtmpMessage};
pub use handshake::server_handshake;
pub use session::RtmpSession;
