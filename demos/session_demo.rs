//! Minimal example: an auto-locking session around a local record store.
//!
//! Run with: `RUST_LOG=envelock=debug cargo run --example session_demo`
//!
//! - Enrols a passphrase (fresh salt + canary) into a JSON file
//! - Encrypts a config blob with the resident key
//! - Locks on a short inactivity timeout and unlocks again from the file

use std::time::Duration;

use envelock::store::{enroll_async, unlock_from_store_async};
use envelock::{score_passphrase, JsonFileStore, SessionConfig, SessionKeyManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let passphrase = "MyVeryStr0ng!Passphrase2024";
    let assessment = score_passphrase(passphrase);
    println!("strength {}/4: {}", assessment.score, assessment.feedback.join("; "));

    // 1. Setup
    let config = SessionConfig::default().with_auto_lock_timeout(Duration::from_secs(2));
    let manager = SessionKeyManager::with_tokio(config)?;
    let mut locked = manager.subscribe();

    let path = std::env::temp_dir().join("envelock_identity.json");
    // Start from a clean slate; enrolment refuses to overwrite an identity.
    let _ = std::fs::remove_file(&path);
    let mut store = JsonFileStore::new(&path);
    enroll_async(&manager, &mut store, passphrase).await?;
    println!("Enrolled identity in {}", path.display());

    // 2. Encrypt something while unlocked
    let sealed = manager.encrypt(br#"{"provider":"local","temperature":0.2}"#)?;
    println!("Sealed envelope: {}", serde_json::to_string(&sealed)?);

    // 3. Wait for the inactivity lock
    locked.recv().await;
    println!("Session locked: unlocked = {}", manager.is_unlocked());

    // 4. Unlock again from the persisted salt + canary, deriving off-thread
    if unlock_from_store_async(&manager, &store, passphrase).await? {
        let plaintext = manager.decrypt(&sealed)?;
        println!("Recovered: {}", String::from_utf8_lossy(&plaintext));
    }

    manager.lock();
    Ok(())
}
