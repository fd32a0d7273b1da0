//! RTSP ingest/egress surface: request parsing and interleaved RTCP
//! frame extraction, grounded on `srs_protocol_rtsp_stack.cpp`'s request
//! dispatch. Deliberately narrow: no session/source-hub wiring, since
//! this protocol is optional ingress and the corpus gives no RTSP-over-TCP
//! production server to generalize a fuller session from.

pub mod interleaved;
pub mod request;
pub mod session;

pub use interleaved::{drain_leading_frames, try_take, InterleavedFrame};
pub use request::{build_response, headers_end, parse_headers, Method, RtspRequest};
pub use session::{respond_to, serve, RtspEvent, RtspReader};
