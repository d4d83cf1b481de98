//! Key derivation and ownership.
//!
//! This module owns two responsibilities:
//! 1. Deriving a 256-bit key from a passphrase and salt with
//!    PBKDF2-HMAC-SHA256.
//! 2. Holding derived key material in a type that is opaque, non-cloneable,
//!    and zeroised on drop.
//!
//! This is one of exactly two modules permitted to import `ring` directly
//! (the other is `crypto`).
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-SHA256(
//!     password   = passphrase (UTF-8),
//!     salt       = per-identity random salt (16 bytes by default),
//!     iterations = 600_000 by default,
//!     dkLen      = 32
//! )
//! ```
//!
//! The same passphrase and salt always yield the same key, which is what
//! makes a later unlock possible. Changing the salt orphans every envelope
//! produced under the old key.

use std::fmt;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::pbkdf2;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::config::{KdfParams, DEFAULT_SALT_LEN};
use crate::crypto::{self, KEY_LEN};
use crate::envelope::Envelope;
use crate::error::{EnvelockError, Result};

static PBKDF2_ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

// ---------------------------------------------------------------------------
// Salt
// ---------------------------------------------------------------------------

/// A per-identity random salt.
///
/// Not secret: it is persisted in the clear next to the canary. It only
/// needs to be unpredictable and unique per passphrase.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generate a fresh salt of `len` bytes from the system RNG.
    pub fn generate(len: usize) -> Result<Self> {
        if len < DEFAULT_SALT_LEN {
            return Err(EnvelockError::config(format!(
                "salt must be at least {} bytes (got {})",
                DEFAULT_SALT_LEN, len
            )));
        }
        let mut bytes = vec![0u8; len];
        crypto::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Wrap previously persisted salt bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < DEFAULT_SALT_LEN {
            return Err(EnvelockError::config(format!(
                "salt must be at least {} bytes (got {})",
                DEFAULT_SALT_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| EnvelockError::config(format!("salt is not base64: {}", e)))?;
        Self::from_bytes(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Salt").field("len", &self.0.len()).finish()
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Salt::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A key derived from a passphrase.
///
/// - Not `Clone`, not serialisable. The raw bytes never leave the crate;
///   callers can only `encrypt` and `decrypt` with it.
/// - Zeroised on drop. Memory is overwritten before deallocation.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Borrow the raw key bytes for use in encrypt/decrypt operations.
    ///
    /// `pub(crate)`: raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Encrypt `plaintext` under this key with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope> {
        crypto::encrypt(self.as_bytes(), plaintext)
    }

    /// Decrypt and authenticate `envelope`.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        crypto::decrypt(self.as_bytes(), envelope)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive a key from `passphrase` and `salt`.
///
/// Deliberately slow: with the default 600,000 iterations this takes a
/// noticeable fraction of a second. Interactive callers should use
/// [`derive_key_async`] or otherwise keep it off a shared dispatcher.
///
/// # Errors
/// `ConfigurationError` for an empty passphrase, a salt whose length does
/// not match `params.salt_len`, or a zero iteration count.
pub fn derive_key(passphrase: &str, salt: &Salt, params: &KdfParams) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(EnvelockError::config("passphrase cannot be empty"));
    }
    if salt.len() != params.salt_len {
        return Err(EnvelockError::config(format!(
            "salt must be {} bytes (got {})",
            params.salt_len,
            salt.len()
        )));
    }
    let iterations = params.iterations()?;

    let started = Instant::now();
    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::derive(
        PBKDF2_ALGORITHM,
        iterations,
        salt.as_bytes(),
        passphrase.as_bytes(),
        &mut bytes,
    );
    let key = DerivedKey { bytes };
    // `bytes` is `Copy`; the stack copy must not outlive the derivation.
    zeroize::Zeroize::zeroize(&mut bytes);

    tracing::debug!(
        iterations = iterations.get(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "derived session key"
    );
    Ok(key)
}

/// Run [`derive_key`] on tokio's blocking pool.
///
/// Dropping the returned future abandons the result; the orphaned task
/// still finishes and its key is zeroised when it is dropped.
pub async fn derive_key_async(
    passphrase: &str,
    salt: &Salt,
    params: &KdfParams,
) -> Result<DerivedKey> {
    let passphrase = Zeroizing::new(passphrase.to_owned());
    let salt = salt.clone();
    let params = *params;
    tokio::task::spawn_blocking(move || derive_key(&passphrase, &salt, &params))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "key derivation task failed");
            EnvelockError::KeyDerivationFailure
        })?
}
