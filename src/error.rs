//! Error types for envelock.
//!
//! Every variant is a distinct failure mode of the session or its
//! primitives. Messages are intentionally minimal: they signal *what*
//! failed without revealing *why* in ways that could leak cryptographic
//! state. In particular, a failed decryption never says whether the key
//! was wrong or the data was tampered with.
//!
//! A wrong passphrase is not an error at all. `unlock` and
//! `verify_passphrase` report it as `Ok(false)`.

use thiserror::Error;

/// Result type alias for envelock operations.
pub type Result<T> = std::result::Result<T, EnvelockError>;

/// The single error type for all envelock operations.
#[derive(Debug, Error)]
pub enum EnvelockError {
    /// Encrypt or decrypt was attempted while the session is locked.
    /// Recoverable by prompting for the passphrase again.
    #[error("session is locked")]
    NotInitialized,

    /// AES-GCM authentication failed. Covers a wrong key and tampered or
    /// corrupted ciphertext alike.
    #[error("incorrect passphrase or corrupted data")]
    DecryptionFailed,

    /// Malformed input from the caller: wrong-length salt or nonce, empty
    /// passphrase, or an invalid configuration value.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Encryption failed. The underlying `ring` operation returned an error.
    #[error("encryption failed")]
    EncryptionFailure,

    /// PBKDF2 could not produce a key (or the derivation task was lost).
    #[error("key derivation failed")]
    KeyDerivationFailure,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// The storage collaborator failed to read or write identity data.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EnvelockError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::ConfigurationError(reason.into())
    }
}
