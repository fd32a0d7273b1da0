//! A minimal, protocol-agnostic RTP envelope shared between the source
//! hub (which only needs to queue and fan out packets) and the full RTP
//! implementation in the `rtc` crate (which owns header/extension
//! parsing). Keeping this shape here — rather than depending on `rtc`
//! from `source-hub` — avoids a dependency cycle, since `rtc` itself
//! depends on `source-hub` to attach RTC sources to the hub.

use bytes::Bytes;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RtpEnvelope {
    pub ssrc: u32,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub payload_type: u8,
    pub marker: bool,
    payload: Arc<Bytes>,
}

impl RtpEnvelope {
    pub fn new(
        ssrc: u32,
        sequence_number: u16,
        timestamp: u32,
        payload_type: u8,
        marker: bool,
        payload: Bytes,
    ) -> Self {
        RtpEnvelope {
            ssrc,
            sequence_number,
            timestamp,
            payload_type,
            marker,
            payload: Arc::new(payload),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Rewrite the outbound SSRC and sequence without copying the
    /// payload — used by the subscriber pipeline's SSRC/PT rewrite step.
    pub fn rewritten(&self, ssrc: u32, sequence_number: u16, payload_type: u8) -> Self {
        RtpEnvelope {
            ssrc,
            sequence_number,
            payload_type,
            timestamp: self.timestamp,
            marker: self.marker,
            payload: Arc::clone(&self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewritten_shares_payload_buffer() {
        let env = RtpEnvelope::new(1, 10, 1000, 96, false, Bytes::from_static(b"x"));
        let rewritten = env.rewritten(2, 11, 97);
        assert!(Arc::ptr_eq(&env.payload, &rewritten.payload));
        assert_eq!(rewritten.ssrc, 2);
        assert_eq!(rewritten.sequence_number, 11);
        assert_eq!(rewritten.payload_type, 97);
        assert_eq!(rewritten.timestamp, env.timestamp);
    }
}
