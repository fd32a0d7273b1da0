//! Track description: the negotiated shape of one RTP media stream
//! within a WebRTC connection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sendonly,
    Recvonly,
    Sendrecv,
    Inactive,
}

impl Direction {
    pub fn can_send(&self) -> bool {
        matches!(self, Direction::Sendonly | Direction::Sendrecv)
    }

    pub fn can_recv(&self) -> bool {
        matches!(self, Direction::Recvonly | Direction::Sendrecv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Opus,
    H264,
    Hevc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDescription {
    pub ssrc: u32,
    pub mid: String,
    pub pt: u8,
    pub codec: Codec,
    pub direction: Direction,
    pub rtx_ssrc: Option<u32>,
    pub fec_ssrc: Option<u32>,
}

impl TrackDescription {
    pub fn is_audio(&self) -> bool {
        self.codec == Codec::Opus
    }

    pub fn is_video(&self) -> bool {
        !self.is_audio()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_capabilities() {
        assert!(Direction::Sendrecv.can_send());
        assert!(Direction::Sendrecv.can_recv());
        assert!(Direction::Sendonly.can_send());
        assert!(!Direction::Sendonly.can_recv());
        assert!(!Direction::Inactive.can_send());
        assert!(!Direction::Inactive.can_recv());
    }

    #[test]
    fn classifies_media_type() {
        let t = TrackDescription {
            ssrc: 1,
            mid: "0".into(),
            pt: 111,
            codec: Codec::Opus,
            direction: Direction::Sendrecv,
            rtx_ssrc: None,
            fec_ssrc: None,
        };
        assert!(t.is_audio());
        assert!(!t.is_video());
    }
}
