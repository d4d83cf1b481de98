//! The self-contained encrypted unit.
//!
//! An envelope is a fresh 96-bit nonce plus the AES-GCM ciphertext (tag
//! appended). It carries everything needed to attempt decryption except the
//! key. The codec never looks inside the plaintext; serialising structured
//! data before encryption is the caller's concern.
//!
//! Two transport forms are supported:
//!
//! ```text
//! JSON:    { "nonce": "<base64>", "ciphertext": "<base64>" }
//! Compact: [ nonce (12 bytes) ][ ciphertext + GCM tag ]
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::error::{EnvelockError, Result};

/// Nonce and ciphertext produced by one encryption call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn new(nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self { nonce, ciphertext }
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext including the trailing authentication tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Rebuild an envelope from its two independently stored base64 fields.
    pub fn from_base64(nonce: &str, ciphertext: &str) -> Result<Self> {
        let nonce = decode_nonce(nonce)?;
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| EnvelockError::config(format!("ciphertext is not base64: {}", e)))?;
        Ok(Self { nonce, ciphertext })
    }

    pub fn nonce_base64(&self) -> String {
        STANDARD.encode(self.nonce)
    }

    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    /// Compact single-blob layout: nonce followed by ciphertext.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the compact layout produced by [`Envelope::to_bytes`].
    ///
    /// Anything shorter than a nonce plus a tag cannot be a valid envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(EnvelockError::config(format!(
                "envelope must be at least {} bytes (got {})",
                NONCE_LEN + TAG_LEN,
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| EnvelockError::config("malformed nonce"))?;
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn decode_nonce(encoded: &str) -> Result<[u8; NONCE_LEN]> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| EnvelockError::config(format!("nonce is not base64: {}", e)))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        EnvelockError::config(format!(
            "nonce must be {} bytes (got {})",
            NONCE_LEN, len
        ))
    })
}

#[derive(Serialize, Deserialize)]
struct EncodedEnvelope {
    nonce: String,
    ciphertext: String,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        EncodedEnvelope {
            nonce: self.nonce_base64(),
            ciphertext: self.ciphertext_base64(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = EncodedEnvelope::deserialize(deserializer)?;
        Envelope::from_base64(&encoded.nonce, &encoded.ciphertext)
            .map_err(serde::de::Error::custom)
    }
}
