//! # envelock
//!
//! Passphrase-derived envelope encryption with an auto-locking session key.
//!
//! A passphrase and a per-identity salt are stretched with
//! PBKDF2-HMAC-SHA256 into an AES-256-GCM key. The key lives only inside a
//! [`SessionKeyManager`] while the session is unlocked; every encryption
//! produces a self-contained [`Envelope`] (fresh nonce + ciphertext). After
//! a period of inactivity the manager locks itself, wipes the key and
//! emits a `"session-locked"` event.
//!
//! ```no_run
//! use std::sync::Arc;
//! use envelock::{store, ManualScheduler, MemoryStore, SessionConfig, SessionKeyManager};
//!
//! # fn main() -> envelock::Result<()> {
//! let manager = SessionKeyManager::new(SessionConfig::default(), Arc::new(ManualScheduler::new()))?;
//! let mut records = MemoryStore::new();
//!
//! store::enroll(&manager, &mut records, "CorrectHorse1!")?;
//! let sealed = manager.encrypt(br#"{"provider":"local"}"#)?;
//!
//! manager.lock();
//! assert!(store::unlock_from_store(&manager, &records, "CorrectHorse1!")?);
//! assert_eq!(manager.decrypt(&sealed)?, br#"{"provider":"local"}"#);
//! # Ok(())
//! # }
//! ```
//!
//! ## Public API
//!
//! The public surface is intentionally narrow. Raw key bytes are never
//! reachable from outside the crate; everything touching `ring` is
//! `pub(crate)`.

// Module declarations.
pub mod config;
pub(crate) mod crypto;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod strength;
pub mod verify;

pub use config::{KdfParams, SessionConfig};
pub use crypto::{KEY_LEN, NONCE_LEN, TAG_LEN};
pub use envelope::Envelope;
pub use error::{EnvelockError, Result};
pub use keys::{derive_key, derive_key_async, DerivedKey, Salt};
pub use scheduler::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
pub use session::{SessionEvent, SessionKeyManager, SessionObserver, SessionStatus};
pub use store::{IdentityStore, JsonFileStore, MemoryStore, StoredIdentity};
pub use strength::{score as score_passphrase, StrengthAssessment};
pub use verify::{create_canary, verify_passphrase, CANARY_PLAINTEXT};
