//! Passphrase verification against a canary envelope.
//!
//! At setup time a fixed known value is encrypted under the new key and
//! persisted next to the salt. A later passphrase attempt is checked by
//! decrypting that canary, never real user data.

use crate::config::KdfParams;
use crate::envelope::Envelope;
use crate::error::{EnvelockError, Result};
use crate::keys::{self, DerivedKey, Salt};

/// The known plaintext sealed into every canary.
pub const CANARY_PLAINTEXT: &[u8] = b"test";

/// Encrypt the canary value under `key`.
pub fn create_canary(key: &DerivedKey) -> Result<Envelope> {
    key.encrypt(CANARY_PLAINTEXT)
}

/// Check whether `passphrase` (with `salt`) reproduces the key that sealed
/// `canary`.
///
/// A wrong passphrase is `Ok(false)`. Errors are reserved for caller bugs
/// such as an empty passphrase or a salt of the wrong length. The temporary
/// key is dropped, and so zeroised, before this returns.
pub fn verify_passphrase(
    passphrase: &str,
    salt: &Salt,
    canary: &Envelope,
    params: &KdfParams,
) -> Result<bool> {
    let key = keys::derive_key(passphrase, salt, params)?;
    canary_matches(&key, canary)
}

/// Decrypt `canary` with an already derived key and compare the plaintext.
pub(crate) fn canary_matches(key: &DerivedKey, canary: &Envelope) -> Result<bool> {
    match key.decrypt(canary) {
        Ok(plaintext) => Ok(plaintext == CANARY_PLAINTEXT),
        Err(EnvelockError::DecryptionFailed) => Ok(false),
        Err(e) => Err(e),
    }
}
