//! Tunable parameters for derivation, the cipher and the auto-lock timer.
//!
//! Every value is named and overridable, but the cipher is fixed to
//! AES-256-GCM, so the key and nonce lengths only validate. They exist so
//! that a persisted configuration written for a different cipher is
//! rejected loudly instead of silently misread.

use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{KEY_LEN, NONCE_LEN};
use crate::error::{EnvelockError, Result};

/// Default PBKDF2-HMAC-SHA256 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Default (and minimum) salt length in bytes (128 bits).
pub const DEFAULT_SALT_LEN: usize = 16;

/// Default inactivity window before the session locks itself.
pub const DEFAULT_AUTO_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Parameters consumed by [`crate::keys::derive_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// Expected salt length in bytes.
    pub salt_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            salt_len: DEFAULT_SALT_LEN,
        }
    }
}

impl KdfParams {
    pub(crate) fn iterations(&self) -> Result<NonZeroU32> {
        NonZeroU32::new(self.iterations)
            .ok_or_else(|| EnvelockError::config("iteration count must be non-zero"))
    }

    /// Check the parameters without deriving anything.
    pub fn validate(&self) -> Result<()> {
        self.iterations()?;
        if self.salt_len < DEFAULT_SALT_LEN {
            return Err(EnvelockError::config(format!(
                "salt must be at least {} bytes (got {})",
                DEFAULT_SALT_LEN, self.salt_len
            )));
        }
        if self.iterations < DEFAULT_ITERATIONS {
            tracing::warn!(
                iterations = self.iterations,
                recommended = DEFAULT_ITERATIONS,
                "kdf iteration count below recommended minimum"
            );
        }
        Ok(())
    }
}

/// Configuration for a [`crate::session::SessionKeyManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub kdf: KdfParams,
    /// Derived key length in bytes. Must be 32.
    pub key_len: usize,
    /// Nonce length in bytes. Must be 12.
    pub nonce_len: usize,
    #[serde(rename = "auto_lock_timeout_secs", with = "duration_secs")]
    pub auto_lock_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            key_len: KEY_LEN,
            nonce_len: NONCE_LEN,
            auto_lock_timeout: DEFAULT_AUTO_LOCK_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document. Absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EnvelockError::config(format!("invalid session config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.kdf.iterations = iterations;
        self
    }

    pub fn with_salt_len(mut self, salt_len: usize) -> Self {
        self.kdf.salt_len = salt_len;
        self
    }

    pub fn with_auto_lock_timeout(mut self, timeout: Duration) -> Self {
        self.auto_lock_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()?;
        if self.key_len != KEY_LEN {
            return Err(EnvelockError::config(format!(
                "key length must be {} bytes for AES-256-GCM (got {})",
                KEY_LEN, self.key_len
            )));
        }
        if self.nonce_len != NONCE_LEN {
            return Err(EnvelockError::config(format!(
                "nonce length must be {} bytes for AES-256-GCM (got {})",
                NONCE_LEN, self.nonce_len
            )));
        }
        if self.auto_lock_timeout.is_zero() {
            return Err(EnvelockError::config("auto-lock timeout must be non-zero"));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SessionConfig::default();
        assert_eq!(config.kdf.iterations, 600_000);
        assert_eq!(config.kdf.salt_len, 16);
        assert_eq!(config.key_len, 32);
        assert_eq!(config.nonce_len, 12);
        assert_eq!(config.auto_lock_timeout, Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config =
            SessionConfig::from_json(r#"{"auto_lock_timeout_secs": 60, "kdf": {"iterations": 700000}}"#)
                .unwrap();
        assert_eq!(config.auto_lock_timeout, Duration::from_secs(60));
        assert_eq!(config.kdf.iterations, 700_000);
        assert_eq!(config.kdf.salt_len, DEFAULT_SALT_LEN);
        assert_eq!(config.key_len, KEY_LEN);
    }

    #[test]
    fn test_rejects_cipher_mismatch() {
        let mut config = SessionConfig::default();
        config.key_len = 16;
        assert!(matches!(
            config.validate(),
            Err(EnvelockError::ConfigurationError(_))
        ));

        let mut config = SessionConfig::default();
        config.nonce_len = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_degenerate_values() {
        assert!(SessionConfig::default().with_iterations(0).validate().is_err());
        assert!(SessionConfig::default().with_salt_len(8).validate().is_err());
        assert!(SessionConfig::default()
            .with_auto_lock_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SessionConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_json_roundtrip_uses_seconds() {
        let config = SessionConfig::default().with_auto_lock_timeout(Duration::from_secs(90));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["auto_lock_timeout_secs"], 90);
    }
}
