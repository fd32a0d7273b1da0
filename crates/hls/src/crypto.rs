//! AES-128 segment encryption, grounded on `SrsHlsMuxer::write_hls_key`:
//! a single 16-byte key covers `fragments_per_key` consecutive segments
//! before a fresh one is generated, each segment gets its own random IV
//! (serialized into the playlist's `#EXT-X-KEY` line so a player can
//! decrypt it), and the key itself is written out to a `.key` file the
//! playlist's key URI points at.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentKey {
    pub key: [u8; KEY_LEN],
    pub iv: [u8; IV_LEN],
}

impl SegmentKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut iv);
        SegmentKey { key, iv }
    }

    pub fn with_new_iv(&self) -> Self {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        SegmentKey { key: self.key, iv }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), &self.iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, &'static str> {
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| "invalid padding or ciphertext length")
    }

    pub fn iv_hex(&self) -> String {
        format!("0x{}", hex::encode(self.iv))
    }
}

/// Tracks whether the key in use needs to be rotated for the next
/// segment, given `fragments_per_key` segments have already used it.
pub struct KeyRotation {
    fragments_per_key: u32,
    segments_since_rotation: u32,
    current: Option<SegmentKey>,
}

impl KeyRotation {
    pub fn new(fragments_per_key: u32) -> Self {
        KeyRotation {
            fragments_per_key: fragments_per_key.max(1),
            segments_since_rotation: 0,
            current: None,
        }
    }

    /// Returns the key to use for the next segment, generating a new key
    /// (and a new sequence number signalling the playlist should emit a
    /// fresh `#EXT-X-KEY`) every `fragments_per_key` segments, and a
    /// fresh IV on every segment in between.
    pub fn next_segment_key(&mut self) -> (SegmentKey, bool) {
        let rotated = match &self.current {
            None => true,
            Some(_) if self.segments_since_rotation >= self.fragments_per_key => true,
            Some(_) => false,
        };

        if rotated {
            self.current = Some(SegmentKey::generate());
            self.segments_since_rotation = 0;
        } else if let Some(prev) = &self.current {
            self.current = Some(prev.with_new_iv());
        }
        self.segments_since_rotation += 1;
        (self.current.expect("just set"), rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = SegmentKey::generate();
        let plaintext = b"hls segment payload bytes, not block aligned";
        let ciphertext = key.encrypt(plaintext);
        let recovered = key.decrypt(&ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn rotation_keeps_same_key_within_fragments_per_key() {
        let mut rotation = KeyRotation::new(3);
        let (k1, new1) = rotation.next_segment_key();
        let (k2, new2) = rotation.next_segment_key();
        let (k3, new3) = rotation.next_segment_key();
        let (k4, new4) = rotation.next_segment_key();

        assert!(new1);
        assert!(!new2 && !new3);
        assert!(new4);
        assert_eq!(k1.key, k2.key);
        assert_eq!(k2.key, k3.key);
        assert_ne!(k3.key, k4.key);
        assert_ne!(k1.iv, k2.iv, "each segment gets its own iv");
    }
}
