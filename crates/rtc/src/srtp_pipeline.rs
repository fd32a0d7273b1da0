//! SRTP (Secure Real-time Transport Protocol) pipeline
//!
//! Implements the AES_CM_128_HMAC_SHA1_80 crypto suite (RFC 3711 Section
//! 4.1.1 / RFC 3711 Section 4.2.1), which is what `crate::dtls`'s
//! DTLS-SRTP `use_srtp` negotiation (RFC 5764) offers as its only
//! profile: AES in Counter Mode for confidentiality plus an
//! 80-bit-truncated HMAC-SHA1 tag for authentication, not an AEAD
//! cipher.
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
use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use proto_types::RtpEnvelope;
use sha1::Sha1;
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};

type AesCtr = ctr::Ctr128BE<Aes128>;
type HmacSha1 = Hmac<Sha1>;

/// Length of the authentication tag appended to each SRTP packet, per
/// the "_80" in AES_CM_128_HMAC_SHA1_80.
const AUTH_TAG_LEN: usize = 10;

/// SRTP configuration
#[derive(Debug, Clone)]
pub struct SrtpConfig {
    /// Master key (16 bytes for AES-128)
    pub master_key: Vec<u8>,
    /// Master salt (14 bytes)
    pub master_salt: Vec<u8>,
    /// SSRC for this stream
    pub ssrc: u32,
    /// Rollover counter (for sequence number extension)
    pub roc: u32,
}

/// SRTP pipeline for encrypting/decrypting RTP packets
pub struct SrtpPipeline {
    /// Session encryption key (derived from master key), 16 bytes
    encryption_key: Vec<u8>,
    /// Session authentication key (derived from master key), 20 bytes
    /// (HMAC-SHA1 uses the full key; only the output is truncated)
    auth_key: Vec<u8>,
    /// Session salt key (derived from master salt), 14 bytes
    salt_key: Vec<u8>,
    /// SSRC
    ssrc: u32,
    /// Sequence number (16 bits, with rollover)
    sequence_number: AtomicU64, // Using u64 to handle rollover
    /// Rollover counter (32 bits, increments when sequence wraps)
    roc: AtomicU64,
}

impl SrtpPipeline {
    /// Create a new SRTP pipeline from configuration
    pub fn new(config: SrtpConfig) -> RtcResult<Self> {
        // Validate key sizes
        if config.master_key.len() != 16 {
            return Err(RtcError::SrtpError(
                format!("Master key must be 16 bytes, got {}", config.master_key.len())
            ));
        }
        if config.master_salt.len() != 14 {
            return Err(RtcError::SrtpError(
                format!("Master salt must be 14 bytes, got {}", config.master_salt.len())
            ));
        }

        // Derive session keys using HKDF from the DTLS-SRTP master key/salt
        let hkdf = Hkdf::<Sha256>::new(None, &config.master_key);
        let mut encryption_key = vec![0u8; 16];
        hkdf.expand(b"SRTP encryption key", &mut encryption_key)
            .map_err(|e| RtcError::SrtpError(format!("HKDF error: {}", e)))?;

        let mut auth_key = vec![0u8; 20]; // HMAC-SHA1 key, RFC 3711 Section 4.2.1
        hkdf.expand(b"SRTP authentication key", &mut auth_key)
            .map_err(|e| RtcError::SrtpError(format!("HKDF error: {}", e)))?;

        let mut salt_key = vec![0u8; 14];
        let hkdf_salt = Hkdf::<Sha256>::new(None, &config.master_salt);
        hkdf_salt.expand(b"SRTP salt key", &mut salt_key)
            .map_err(|e| RtcError::SrtpError(format!("HKDF error: {}", e)))?;

        Ok(SrtpPipeline {
            encryption_key,
            auth_key,
            salt_key,
            ssrc: config.ssrc,
            sequence_number: AtomicU64::new(0),
            roc: AtomicU64::new(config.roc as u64),
        })
    }

    /// Track a packet's sequence number against the rollover counter,
    /// returning the ROC to use for this packet. Mirrors RFC 3711
    /// Appendix A's rollover-detection approach: a sequence number much
    /// lower than the last one seen means the 16-bit counter wrapped.
    fn track_sequence(&self, seq_low: u16) -> u32 {
        let roc = self.roc.load(Ordering::SeqCst) as u32;
        let current_seq = self.sequence_number.load(Ordering::SeqCst);
        let seq_combined = (roc as u64) << 16 | (seq_low as u64);

        if seq_combined > current_seq {
            self.sequence_number.store(seq_combined, Ordering::SeqCst);
            if seq_low < (current_seq & 0xFFFF) as u16 {
                self.roc.fetch_add(1, Ordering::SeqCst);
                return roc + 1;
            }
        }

        roc
    }

    /// Encrypt an RTP envelope to an on-wire SRTP packet: RTP header,
    /// AES-CM-encrypted payload, then the HMAC-SHA1-80 auth tag over
    /// both (RFC 3711 Section 4.2).
    pub fn encrypt(&self, packet: &RtpEnvelope) -> RtcResult<Vec<u8>> {
        let seq_low = packet.sequence_number;
        let roc = self.track_sequence(seq_low);

        let header = crate::rtp_handler::RtpHeader::from_envelope(packet);
        let header_bytes = header.serialize();

        let mut keystream_input = packet.payload().to_vec();
        let mut cipher = self.make_cipher(seq_low, roc)?;
        cipher.apply_keystream(&mut keystream_input);

        let mut srtp_packet = header_bytes.to_vec();
        srtp_packet.extend_from_slice(&keystream_input);

        let tag = self.authenticate(&srtp_packet, roc)?;
        srtp_packet.extend_from_slice(&tag);

        Ok(srtp_packet)
    }

    /// Decrypt an on-wire SRTP packet back to an RTP envelope, verifying
    /// the authentication tag before decrypting.
    pub fn decrypt(&self, srtp_data: &[u8]) -> RtcResult<RtpEnvelope> {
        if srtp_data.len() < AUTH_TAG_LEN {
            return Err(RtcError::SrtpError(
                "SRTP packet too short for authentication tag".to_string(),
            ));
        }
        let (authenticated, tag) = srtp_data.split_at(srtp_data.len() - AUTH_TAG_LEN);

        let (header, encrypted_payload) = crate::rtp_handler::RtpHeader::parse(authenticated)?;
        let seq_low = header.sequence_number;
        let roc = self.track_sequence(seq_low);

        let expected_tag = self.authenticate(authenticated, roc)?;
        if expected_tag.as_slice() != tag {
            return Err(RtcError::SrtpError(
                "SRTP authentication tag mismatch".to_string(),
            ));
        }

        let mut plaintext = encrypted_payload.to_vec();
        let mut cipher = self.make_cipher(seq_low, roc)?;
        cipher.apply_keystream(&mut plaintext);

        Ok(header.into_envelope(plaintext.into()))
    }

    /// HMAC-SHA1 over the given bytes plus the ROC (RFC 3711 Section
    /// 4.2), truncated to the 80-bit tag length.
    fn authenticate(&self, data: &[u8], roc: u32) -> RtcResult<Vec<u8>> {
        let mut mac = HmacSha1::new_from_slice(&self.auth_key)
            .map_err(|e| RtcError::SrtpError(format!("HMAC init error: {}", e)))?;
        mac.update(data);
        mac.update(&roc.to_be_bytes());
        let full_tag = mac.finalize().into_bytes();
        Ok(full_tag[..AUTH_TAG_LEN].to_vec())
    }

    /// Build an AES-CM cipher keyed for this packet's counter block.
    fn make_cipher(&self, seq_low: u16, roc: u32) -> RtcResult<AesCtr> {
        let iv = self.generate_iv(seq_low, roc);
        AesCtr::new_from_slices(&self.encryption_key, &iv)
            .map_err(|e| RtcError::SrtpError(format!("Cipher init error: {}", e)))
    }

    /// Generate the 16-byte AES-CM counter block per RFC 3711 Section
    /// 4.1.1: zero-padding, SSRC, then the 48-bit packet index (ROC
    /// followed by the sequence number) laid end to end, XORed with the
    /// session salt over its first 14 bytes.
    fn generate_iv(&self, seq_low: u16, roc: u32) -> Vec<u8> {
        let mut iv = vec![0u8; 16];

        iv[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        iv[10..14].copy_from_slice(&roc.to_be_bytes());
        iv[14..16].copy_from_slice(&seq_low.to_be_bytes());

        for i in 0..self.salt_key.len().min(14) {
            iv[i] ^= self.salt_key[i];
        }

        iv
    }

    /// Get current sequence number
    pub fn current_sequence(&self) -> u64 {
        self.sequence_number.load(Ordering::SeqCst)
    }

    /// Get current rollover counter
    pub fn current_roc(&self) -> u32 {
        self.roc.load(Ordering::SeqCst) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn create_test_packet() -> RtpEnvelope {
        RtpEnvelope::new(12345, 1, 1000, 96, false, Bytes::from("test payload data"))
    }

    fn test_pipeline() -> SrtpPipeline {
        let config = SrtpConfig {
            master_key: vec![0u8; 16],
            master_salt: vec![0u8; 14],
            ssrc: 12345,
            roc: 0,
        };
        SrtpPipeline::new(config).unwrap()
    }

    #[test]
    fn test_srtp_encrypt_decrypt() {
        let pipeline = test_pipeline();
        let packet = create_test_packet();

        let encrypted = pipeline.encrypt(&packet).unwrap();
        let decrypted = pipeline.decrypt(&encrypted).unwrap();

        assert_eq!(packet.sequence_number, decrypted.sequence_number);
        assert_eq!(packet.timestamp, decrypted.timestamp);
        assert_eq!(packet.ssrc, decrypted.ssrc);
        assert_eq!(packet.payload(), decrypted.payload());
    }

    #[test]
    fn test_srtp_tampered_packet_fails_authentication() {
        let pipeline = test_pipeline();
        let packet = create_test_packet();

        let mut encrypted = pipeline.encrypt(&packet).unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;

        assert!(pipeline.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_srtp_sequence_tracking() {
        let pipeline = test_pipeline();

        for i in 0..10u16 {
            let packet = RtpEnvelope::new(12345, i + 1, 1000, 96, false, Bytes::from("x"));
            pipeline.encrypt(&packet).unwrap();
        }

        let last_seq = pipeline.current_sequence();
        assert!(last_seq >= 10, "Expected sequence >= 10, got {}", last_seq);
    }
}
