//! HLS segmenter: turns a `Source`'s FLV-shaped packet stream into TS or
//! fMP4 segments and an atomically-rewritten m3u8 playlist, grounded on
//! `SrsHls`/`SrsHlsMuxer`/`SrsHlsFmp4Muxer` in `srs_app_hls.hpp`.

pub mod boundary;
pub mod crypto;
pub mod fmp4;
pub mod playlist;
pub mod session;
pub mod ts;

pub use boundary::{should_reap, SegmentClock};
pub use crypto::{KeyRotation, SegmentKey};
pub use playlist::{render, write_atomic, PlaylistSegment, SegmentWindow};
pub use session::HlsSession;
