//! Session key custody.
//!
//! [`SessionKeyManager`] is the only owner of a [`DerivedKey`]. It is either
//! `Locked` (no key) or `Unlocked` (key, start time, armed inactivity
//! timer). Every operation's precondition is expressed in terms of that
//! state alone:
//!
//! ```text
//! Locked   --initialize / unlock(ok)-->  Unlocked
//! Locked   --unlock(wrong passphrase)--> Locked        (Ok(false))
//! Unlocked --encrypt / decrypt / activity--> Unlocked  (timer re-armed)
//! Unlocked --lock / timeout-->           Locked        ("session-locked")
//! ```
//!
//! Callers are expected to serialise calls to one manager. The internal
//! mutex exists so the timer callback, which runs on the scheduler's
//! thread, can lock the session safely.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::SessionConfig;
use crate::envelope::Envelope;
use crate::error::{EnvelockError, Result};
use crate::keys::{self, DerivedKey, Salt};
use crate::scheduler::{Scheduler, TimerHandle, TokioScheduler};
use crate::verify;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Events emitted by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// The session moved to `Locked`, explicitly or by timeout.
    #[serde(rename = "session-locked")]
    Locked,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Locked => "session-locked",
        }
    }
}

/// Receives session events. Implement this to force re-authentication in a
/// UI, or pass any `FnMut(SessionEvent) + Send` closure.
///
/// Observers run with no manager lock held and may call back into the
/// manager, including registering further observers.
pub trait SessionObserver: Send {
    /// Deliver `event`. Returning `false` unregisters the observer.
    fn notify(&mut self, event: SessionEvent) -> bool;
}

impl<F> SessionObserver for F
where
    F: FnMut(SessionEvent) + Send,
{
    fn notify(&mut self, event: SessionEvent) -> bool {
        self(event);
        true
    }
}

/// Forwards events into a tokio channel. Unregistered once its receiver is
/// dropped.
pub struct ChannelObserver {
    sender: UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }
}

impl SessionObserver for ChannelObserver {
    fn notify(&mut self, event: SessionEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockReason {
    Explicit,
    Timeout,
}

impl LockReason {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Timeout => "timeout",
        }
    }
}

struct Unlocked {
    key: DerivedKey,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

enum SessionState {
    Locked,
    Unlocked(Unlocked),
}

struct Inner {
    state: SessionState,
    timer: Option<Box<dyn TimerHandle>>,
    /// Bumped on every arm and disarm; a firing timer from an older
    /// generation is stale and does nothing.
    generation: u64,
}

struct Shared {
    config: SessionConfig,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<Inner>,
    observers: Mutex<Vec<Box<dyn SessionObserver>>>,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Box<dyn SessionObserver>>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn disarm(inner: &mut Inner) {
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(mut timer) = inner.timer.take() {
            timer.cancel();
        }
    }

    fn arm(self: &Arc<Self>, inner: &mut Inner) {
        Self::disarm(inner);
        let generation = inner.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.scheduler.schedule_once(
            self.config.auto_lock_timeout,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.expire(generation);
                }
            }),
        );
        inner.timer = Some(handle);
    }

    fn expire(&self, generation: u64) {
        {
            let mut inner = self.inner();
            if inner.generation != generation {
                return;
            }
            if !Self::discard_key(&mut inner) {
                return;
            }
        }
        self.announce_lock(LockReason::Timeout);
    }

    /// Drop the key and the timer. Returns whether a transition happened.
    fn discard_key(inner: &mut Inner) -> bool {
        Self::disarm(inner);
        match std::mem::replace(&mut inner.state, SessionState::Locked) {
            SessionState::Unlocked(_) => true,
            SessionState::Locked => false,
        }
    }

    fn announce_lock(&self, reason: LockReason) {
        tracing::info!(reason = reason.as_str(), "session locked");
        // Notify from a detached list so observers can re-enter the manager.
        let mut notified = std::mem::take(&mut *self.observers());
        let before = notified.len();
        notified.retain_mut(|observer| observer.notify(SessionEvent::Locked));
        if notified.len() < before {
            tracing::debug!(
                dropped = before - notified.len(),
                "unregistered closed session observers"
            );
        }

        let mut observers = self.observers();
        let added = std::mem::replace(&mut *observers, notified);
        observers.extend(added);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::disarm(inner);
    }
}

/// A point-in-time view of the session. Contains no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub unlocked: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the resident key for one unlocked session.
///
/// Cloning yields another handle to the same session. Independent sessions
/// (for example in parallel tests) are separate `new` calls.
#[derive(Clone)]
pub struct SessionKeyManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyManager")
            .field("unlocked", &self.is_unlocked())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl SessionKeyManager {
    /// Create a locked manager.
    pub fn new(config: SessionConfig, scheduler: Arc<dyn Scheduler>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                scheduler,
                inner: Mutex::new(Inner {
                    state: SessionState::Locked,
                    timer: None,
                    generation: 0,
                }),
                observers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Create a locked manager whose auto-lock timer runs on the current
    /// tokio runtime.
    ///
    /// The manager must not outlive that runtime: once it shuts down, the
    /// auto-lock no longer fires and only an explicit `lock()` or dropping
    /// the manager releases the key.
    pub fn with_tokio(config: SessionConfig) -> Result<Self> {
        let scheduler = TokioScheduler::current()?;
        Self::new(config, Arc::new(scheduler))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Register an observer for lock notifications.
    pub fn add_observer(&self, observer: Box<dyn SessionObserver>) {
        self.shared.observers().push(observer);
    }

    /// Channel-backed shorthand for [`SessionKeyManager::add_observer`].
    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.add_observer(Box::new(ChannelObserver::new(sender)));
        receiver
    }

    /// Derive a key and start a session.
    ///
    /// With `salt == None` a fresh salt is generated (first-time setup).
    /// Returns the salt used, which the caller must persist. Calling this
    /// while already unlocked replaces the resident key.
    pub fn initialize(&self, passphrase: &str, salt: Option<Salt>) -> Result<Salt> {
        let salt = self.resolve_salt(salt)?;
        let key = keys::derive_key(passphrase, &salt, &self.shared.config.kdf)?;
        self.install(key);
        tracing::info!("session initialized");
        Ok(salt)
    }

    /// [`SessionKeyManager::initialize`] with the derivation moved to
    /// tokio's blocking pool.
    pub async fn initialize_async(&self, passphrase: &str, salt: Option<Salt>) -> Result<Salt> {
        let salt = self.resolve_salt(salt)?;
        let key = keys::derive_key_async(passphrase, &salt, &self.shared.config.kdf).await?;
        self.install(key);
        tracing::info!("session initialized");
        Ok(salt)
    }

    /// Unlock with a passphrase checked against `canary`.
    ///
    /// A wrong passphrase is `Ok(false)` and leaves the current state as it
    /// was. Errors mean a caller bug (empty passphrase, wrong salt length).
    pub fn unlock(&self, passphrase: &str, salt: &Salt, canary: &Envelope) -> Result<bool> {
        let key = keys::derive_key(passphrase, salt, &self.shared.config.kdf)?;
        self.finish_unlock(key, canary)
    }

    /// [`SessionKeyManager::unlock`] with the derivation moved to tokio's
    /// blocking pool.
    pub async fn unlock_async(
        &self,
        passphrase: &str,
        salt: &Salt,
        canary: &Envelope,
    ) -> Result<bool> {
        let key = keys::derive_key_async(passphrase, salt, &self.shared.config.kdf).await?;
        self.finish_unlock(key, canary)
    }

    /// Discard the key and cancel the timer. A no-op when already locked.
    pub fn lock(&self) {
        let transitioned = {
            let mut inner = self.shared.inner();
            Shared::discard_key(&mut inner)
        };
        if transitioned {
            self.shared.announce_lock(LockReason::Explicit);
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.shared.inner().state, SessionState::Unlocked(_))
    }

    pub fn status(&self) -> SessionStatus {
        match &self.shared.inner().state {
            SessionState::Locked => SessionStatus {
                unlocked: false,
                started_at: None,
                last_activity_at: None,
            },
            SessionState::Unlocked(session) => SessionStatus {
                unlocked: true,
                started_at: Some(session.started_at),
                last_activity_at: Some(session.last_activity_at),
            },
        }
    }

    /// Encrypt with the resident key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope> {
        self.with_key(|key| key.encrypt(plaintext))
    }

    /// Decrypt with the resident key. A failed decryption does not count as
    /// activity.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        self.with_key(|key| key.decrypt(envelope))
    }

    /// Seal the canary value under the resident key, for first-time setup.
    pub fn create_canary(&self) -> Result<Envelope> {
        self.with_key(verify::create_canary)
    }

    /// Reset the inactivity timer without touching any data.
    pub fn record_activity(&self) -> Result<()> {
        self.with_key(|_| Ok(()))
    }

    fn resolve_salt(&self, salt: Option<Salt>) -> Result<Salt> {
        match salt {
            Some(salt) => Ok(salt),
            None => Salt::generate(self.shared.config.kdf.salt_len),
        }
    }

    fn finish_unlock(&self, key: DerivedKey, canary: &Envelope) -> Result<bool> {
        if !verify::canary_matches(&key, canary)? {
            tracing::warn!("unlock rejected: incorrect passphrase or corrupted canary");
            return Ok(false);
        }
        self.install(key);
        tracing::info!("session unlocked");
        Ok(true)
    }

    fn install(&self, key: DerivedKey) {
        let now = Utc::now();
        let mut inner = self.shared.inner();
        inner.state = SessionState::Unlocked(Unlocked {
            key,
            started_at: now,
            last_activity_at: now,
        });
        self.shared.arm(&mut inner);
    }

    /// Run `op` against the resident key; on success, record activity and
    /// re-arm the timer.
    fn with_key<T>(&self, op: impl FnOnce(&DerivedKey) -> Result<T>) -> Result<T> {
        let mut inner = self.shared.inner();
        let output = match &mut inner.state {
            SessionState::Locked => return Err(EnvelockError::NotInitialized),
            SessionState::Unlocked(session) => {
                let output = op(&session.key)?;
                session.last_activity_at = Utc::now();
                output
            }
        };
        self.shared.arm(&mut inner);
        Ok(output)
    }
}
