//! SRT ingest/egress: `streamid` parsing and MPEG-TS 188-byte framing,
//! wired to the shared source hub the same way the `rtmp` crate is.
//!
//! Grounded on `srs_app_srt_conn.cpp`'s streamid handling and its
//! MPEG-TS demux/mux, generalized to this crate's session/source-hub
//! plumbing rather than SRS's own connection bookkeeping.

pub mod session;
pub mod streamid;
pub mod ts;

pub use session::SrtSession;
pub use streamid::{Mode, StreamId};
pub use ts::{encode_packets, parse_packet, TsFramer, TsPacket};
