//! DTLS-SRTP negotiation state (RFC 5764): tracks the certificate
//! fingerprint exchange carried over SDP (see `sdp.rs`'s
//! `get_dtls_fingerprint`) and, once a handshake elsewhere has produced a
//! master secret, derives this connection's SRTP key material straight
//! into an `SrtpConfig` the session layer can hand to `SrtpPipeline::new`.
//!
//! The record-level handshake itself (ClientHello/ServerHello framing,
//! certificate verification) isn't implemented here: this workspace has
//! no live UDP transport to drive it over (see `http.rs`'s negotiation
//! handler), so this module owns only the state both sides of that
//! handshake agree on before and after it runs.
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

use crate::error::{RtcError, RtcResult};
use crate::srtp_pipeline::SrtpConfig;
use std::net::SocketAddr;
use uuid::Uuid;

/// DTLS state (RFC 6347 Section 4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsState {
    /// Closed - no connection
    Closed,
    /// Connecting - handshake in progress
    Connecting,
    /// Connected - handshake complete
    Connected,
    /// Failed - handshake failed
    Failed,
}

/// One peer's DTLS-SRTP negotiation state: the addresses it runs over,
/// the fingerprints both sides exchanged via SDP, and the master secret
/// a completed handshake leaves behind.
pub struct DtlsConnection {
    pub connection_id: Uuid,
    pub local_addr: SocketAddr,
    pub remote_addr: Option<SocketAddr>,
    pub state: DtlsState,
    /// Local certificate fingerprint (SHA-256), advertised in our SDP answer.
    pub local_fingerprint: Option<String>,
    /// Remote certificate fingerprint (SHA-256), taken from the peer's SDP offer.
    pub remote_fingerprint: Option<String>,
    /// Master secret a completed handshake produced; feeds `derive_srtp_config`.
    pub master_secret: Option<Vec<u8>>,
}

impl DtlsConnection {
    pub fn new(connection_id: Uuid, local_addr: SocketAddr) -> Self {
        DtlsConnection {
            connection_id,
            local_addr,
            remote_addr: None,
            state: DtlsState::Closed,
            local_fingerprint: None,
            remote_fingerprint: None,
            master_secret: None,
        }
    }

    /// The peer's fingerprint checked out and a handshake is under way.
    pub fn begin_handshake(&mut self) {
        self.state = DtlsState::Connecting;
    }

    pub fn mark_failed(&mut self) {
        self.state = DtlsState::Failed;
    }

    /// Record the negotiated master secret and move to `Connected`.
    pub fn complete_handshake(&mut self, master_secret: Vec<u8>) -> RtcResult<()> {
        self.master_secret = Some(master_secret);
        self.state = DtlsState::Connected;
        Ok(())
    }

    /// Derive this connection's SRTP master key/salt from the DTLS
    /// master secret per RFC 5764 Section 4.2 and package them as the
    /// `SrtpConfig` the caller hands to `SrtpPipeline::new`.
    pub fn derive_srtp_config(&self, ssrc: u32) -> RtcResult<SrtpConfig> {
        let master_secret = self
            .master_secret
            .as_ref()
            .ok_or_else(|| RtcError::ConfigError("DTLS handshake not complete".to_string()))?;

        use hkdf::Hkdf;
        use sha2::Sha256;
        let hkdf = Hkdf::<Sha256>::new(None, master_secret);

        let mut master_key = vec![0u8; 16];
        hkdf.expand(b"EXTRACTOR-dtls_srtp", &mut master_key)
            .map_err(|e| RtcError::SrtpError(format!("key derivation error: {e}")))?;

        let mut master_salt = vec![0u8; 14];
        hkdf.expand(b"EXTRACTOR-dtls_srtp_salt", &mut master_salt)
            .map_err(|e| RtcError::SrtpError(format!("salt derivation error: {e}")))?;

        Ok(SrtpConfig { master_key, master_salt, ssrc, roc: 0 })
    }

    pub fn set_local_fingerprint(&mut self, fingerprint: String) {
        self.local_fingerprint = Some(fingerprint);
    }

    pub fn set_remote_fingerprint(&mut self, fingerprint: String) {
        self.remote_fingerprint = Some(fingerprint);
    }

    /// Verify remote fingerprint matches certificate
    pub fn verify_remote_fingerprint(&self, expected: &str) -> RtcResult<()> {
        let remote = self
            .remote_fingerprint
            .as_ref()
            .ok_or_else(|| RtcError::ConfigError("Remote fingerprint not set".to_string()))?;

        if remote != expected {
            return Err(RtcError::ConfigError(format!(
                "Fingerprint mismatch: expected {expected}, got {remote}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn conn() -> DtlsConnection {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5000);
        DtlsConnection::new(Uuid::new_v4(), addr)
    }

    #[test]
    fn starts_closed() {
        let c = conn();
        assert_eq!(c.state, DtlsState::Closed);
    }

    #[test]
    fn begin_and_complete_handshake_advance_state() {
        let mut c = conn();
        c.begin_handshake();
        assert_eq!(c.state, DtlsState::Connecting);
        c.complete_handshake(vec![0u8; 48]).unwrap();
        assert_eq!(c.state, DtlsState::Connected);
    }

    #[test]
    fn derive_srtp_config_before_handshake_fails() {
        let c = conn();
        assert!(c.derive_srtp_config(1).is_err());
    }

    #[test]
    fn derive_srtp_config_produces_rfc3711_key_lengths() {
        let mut c = conn();
        c.complete_handshake(vec![7u8; 48]).unwrap();
        let config = c.derive_srtp_config(0xCAFEBABE).unwrap();
        assert_eq!(config.master_key.len(), 16);
        assert_eq!(config.master_salt.len(), 14);
        assert_eq!(config.ssrc, 0xCAFEBABE);
    }

    #[test]
    fn fingerprint_mismatch_is_rejected() {
        let mut c = conn();
        c.set_remote_fingerprint("AA:BB".to_string());
        assert!(c.verify_remote_fingerprint("CC:DD").is_err());
        assert!(c.verify_remote_fingerprint("AA:BB").is_ok());
    }
}

