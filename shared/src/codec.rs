//! AEAD envelope codec for the encrypted control channel
//!
//! Every post-handshake message is framed as:
//! ```text
//! { "nonce": base64(12 random bytes), "ciphertext": base64(AES-256-GCM ciphertext ++ 16-byte tag) }
//! ```
//!
//! The handshake itself predates the shared key, so inbound frames come in
//! two shapes: sealed envelopes and plaintext control messages. [`classify`]
//! resolves that distinction exactly once, at the transport boundary.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce length in bytes (96 bits, one fresh random nonce per message).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended to the ciphertext.
pub const TAG_LEN: usize = 16;

/// Errors that can occur while sealing or opening envelopes.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 in {field}")]
    Base64 { field: &'static str },

    #[error("sealed payload too short: {0} bytes (tag is {TAG_LEN})")]
    Truncated(usize),

    #[error("nonce must be {NONCE_LEN} bytes, got {0}")]
    BadNonce(usize),

    #[error("authentication failed")]
    Auth,
}

/// The 256-bit symmetric key derived by the handshake. Lives exactly as
/// long as the connection it was negotiated for; zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealKey([u8; 32]);

impl SealKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealKey(..)")
    }
}

/// The encrypted wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedFrame {
    pub nonce: String,
    pub ciphertext: String,
}

/// An inbound raw message resolved into one of its two wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    /// An AEAD envelope carrying `nonce` and `ciphertext`.
    Sealed(SealedFrame),
    /// A plaintext control message (the handshake reply); delivered
    /// downstream unmodified.
    Plain(Value),
}

/// Seal a serialized message into an envelope with a fresh random nonce.
pub fn seal(key: &SealKey, plaintext: &[u8]) -> Result<SealedFrame, CodecError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| CodecError::Auth)?;

    Ok(SealedFrame {
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Open an envelope, verifying the trailing authentication tag.
///
/// A forged or corrupted frame fails with [`CodecError::Auth`] and must be
/// dropped by the caller; it never yields partial plaintext.
pub fn open(key: &SealKey, frame: &SealedFrame) -> Result<Vec<u8>, CodecError> {
    let nonce = BASE64
        .decode(&frame.nonce)
        .map_err(|_| CodecError::Base64 { field: "nonce" })?;
    if nonce.len() != NONCE_LEN {
        return Err(CodecError::BadNonce(nonce.len()));
    }

    let ciphertext = BASE64
        .decode(&frame.ciphertext)
        .map_err(|_| CodecError::Base64 { field: "ciphertext" })?;
    if ciphertext.len() < TAG_LEN {
        return Err(CodecError::Truncated(ciphertext.len()));
    }

    key.cipher()
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CodecError::Auth)
}

/// Resolve one raw inbound message into a [`WireFrame`].
///
/// A JSON object carrying both `nonce` and `ciphertext` strings is a sealed
/// envelope; anything else passes through as plaintext.
pub fn classify(raw: &str) -> Result<WireFrame, CodecError> {
    let value: Value = serde_json::from_str(raw)?;

    let is_sealed = value
        .as_object()
        .map(|obj| obj.get("nonce").is_some_and(Value::is_string)
            && obj.get("ciphertext").is_some_and(Value::is_string))
        .unwrap_or(false);

    if is_sealed {
        let frame: SealedFrame = serde_json::from_value(value)?;
        Ok(WireFrame::Sealed(frame))
    } else {
        Ok(WireFrame::Plain(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SealKey {
        SealKey::new([7u8; 32])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key();
        let plaintext = br#"{"action":"land","token":"t"}"#;

        let frame = seal(&key, plaintext).expect("seal failed");
        let opened = open(&key, &frame).expect("open failed");

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let key = test_key();
        let plaintext = b"same message";

        let a = seal(&key, plaintext).unwrap();
        let b = seal(&key, plaintext).unwrap();

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_replayed_frame_still_opens() {
        // The protocol claims no replay protection; a captured envelope
        // opens again with the same key.
        let key = test_key();
        let frame = seal(&key, b"tick").unwrap();

        assert_eq!(open(&key, &frame).unwrap(), b"tick");
        assert_eq!(open(&key, &frame).unwrap(), b"tick");
    }

    #[test]
    fn test_wrong_key_fails() {
        let frame = seal(&test_key(), b"secret").unwrap();
        let other = SealKey::new([8u8; 32]);

        assert!(matches!(open(&other, &frame), Err(CodecError::Auth)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let frame = seal(&key, b"payload").unwrap();

        let mut bytes = BASE64.decode(&frame.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        let tampered = SealedFrame {
            nonce: frame.nonce.clone(),
            ciphertext: BASE64.encode(bytes),
        };

        assert!(matches!(open(&key, &tampered), Err(CodecError::Auth)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = test_key();
        let frame = seal(&key, b"payload").unwrap();

        let mut bytes = BASE64.decode(&frame.ciphertext).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        let tampered = SealedFrame {
            nonce: frame.nonce,
            ciphertext: BASE64.encode(bytes),
        };

        assert!(matches!(open(&key, &tampered), Err(CodecError::Auth)));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = test_key();
        let frame = SealedFrame {
            nonce: BASE64.encode([0u8; NONCE_LEN]),
            ciphertext: BASE64.encode([0u8; TAG_LEN - 1]),
        };

        assert!(matches!(open(&key, &frame), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_classify_sealed() {
        let key = test_key();
        let frame = seal(&key, b"x").unwrap();
        let raw = serde_json::to_string(&frame).unwrap();

        match classify(&raw).unwrap() {
            WireFrame::Sealed(parsed) => assert_eq!(parsed, frame),
            other => panic!("expected sealed frame, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_plaintext_passthrough() {
        let raw = r#"{"server_public_key": "AAAA"}"#;

        match classify(raw).unwrap() {
            WireFrame::Plain(value) => assert_eq!(value["server_public_key"], "AAAA"),
            other => panic!("expected plaintext, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_rejects_non_json() {
        assert!(classify("not json").is_err());
    }
}
