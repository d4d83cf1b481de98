//! Low-level cryptographic operations.
//!
//! This module is one of exactly two places in the crate that import `ring`
//! directly (the other is `keys`). All other modules encrypt and decrypt
//! exclusively through the functions exposed here, usually by way of
//! `DerivedKey`.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption, no associated data)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::envelope::Envelope;
use crate::error::{EnvelockError, Result};

/// The AEAD algorithm used throughout envelock.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Generate a cryptographically secure random nonce.
///
/// A fresh nonce is generated for every encryption call. There is no nonce
/// caching or counter-based generation, so nothing has to survive a restart
/// for nonces to stay unique.
fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut buf = [0u8; NONCE_LEN];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Fill `buf` from the system RNG. The only source of randomness in the crate.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| EnvelockError::RandomnessFailure)
}

fn bind_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| EnvelockError::config("key rejected by AES-256-GCM"))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt a plaintext payload using AES-256-GCM.
///
/// The returned envelope carries its own nonce; the ciphertext includes the
/// 16-byte GCM tag.
pub(crate) fn encrypt(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Envelope> {
    let key = bind_key(key_bytes)?;
    let nonce = generate_nonce()?;

    let mut ciphertext = Vec::with_capacity(plaintext.len() + ALGORITHM.tag_len());
    ciphertext.extend_from_slice(plaintext);

    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        aead::Aad::empty(),
        &mut ciphertext,
    )
    .map_err(|_| EnvelockError::EncryptionFailure)?;

    Ok(Envelope::new(nonce, ciphertext))
}

/// Decrypt an envelope using AES-256-GCM.
///
/// If the key is wrong or the ciphertext has been tampered with, the GCM
/// authentication check fails and this returns `DecryptionFailed`. The two
/// causes are indistinguishable and the caller receives no partial
/// plaintext.
pub(crate) fn decrypt(key_bytes: &[u8; KEY_LEN], envelope: &Envelope) -> Result<Vec<u8>> {
    if envelope.ciphertext().len() < TAG_LEN {
        return Err(EnvelockError::DecryptionFailed);
    }

    let key = bind_key(key_bytes)?;
    let mut payload = envelope.ciphertext().to_vec();

    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(*envelope.nonce()),
            aead::Aad::empty(),
            &mut payload,
        )
        .map_err(|_| EnvelockError::DecryptionFailed)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [7u8; KEY_LEN];
        let envelope = encrypt(&key, b"opaque payload").unwrap();
        assert_eq!(envelope.ciphertext().len(), b"opaque payload".len() + TAG_LEN);
        assert_eq!(decrypt(&key, &envelope).unwrap(), b"opaque payload");
    }

    #[test]
    fn test_empty_plaintext_is_tag_only() {
        let key = [7u8; KEY_LEN];
        let envelope = encrypt(&key, b"").unwrap();
        assert_eq!(envelope.ciphertext().len(), TAG_LEN);
        assert!(decrypt(&key, &envelope).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_and_truncation_fail_alike() {
        let envelope = encrypt(&[1u8; KEY_LEN], b"secret").unwrap();

        let wrong_key = decrypt(&[2u8; KEY_LEN], &envelope).unwrap_err();
        assert!(matches!(wrong_key, EnvelockError::DecryptionFailed));

        let truncated = Envelope::new(*envelope.nonce(), envelope.ciphertext()[..4].to_vec());
        let short = decrypt(&[1u8; KEY_LEN], &truncated).unwrap_err();
        assert!(matches!(short, EnvelockError::DecryptionFailed));

        assert_eq!(wrong_key.to_string(), short.to_string());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = [3u8; KEY_LEN];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }
}
