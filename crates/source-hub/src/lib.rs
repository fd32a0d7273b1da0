//! The per-stream source/consumer graph: one `Source` per canonical
//! stream URL holding the sequence-header cache, GOP cache and jitter
//! correction, fanning out to bounded per-subscriber `Consumer` queues,
//! with `Bridge`s translating between protocol-specific wire shapes.
//!
//! Grounded on `stream_manager.rs` (the source table and per-connection
//! bookkeeping) and `protocol_bridge.rs` (the cross-protocol relay
//! shape), generalized from ArcRTC/WebRTC specifics to the FLV/RTP
//! duality this routing core actually carries.

pub mod bridge;
pub mod consumer;
pub mod gop_cache;
pub mod item;
pub mod jitter;
pub mod manager;
pub mod seq_header_cache;
pub mod source;

pub use bridge::{Bridge, PassthroughFlv, SrtToRtmp, Translate};
pub use consumer::{Consumer, DrainOutcome};
pub use gop_cache::GopCache;
pub use item::MediaItem;
pub use jitter::JitterCorrector;
pub use manager::SourceManager;
pub use seq_header_cache::SeqHeaderCache;
pub use source::Source;
