//! Server-side session records and the store interface.
//!
//! The cookie only ever carries a signed session identifier; these records
//! are the authoritative state for a logged-in client.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::now_unix;

pub mod fs;
pub mod memory;
pub mod sweeper;

pub use fs::FsSessionStore;
pub use memory::MemorySessionStore;

/// Prefix for per-session files and store keys.
pub const SESSION_FILE_PREFIX: &str = "session:";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at_unix: i64,
    pub last_seen_at_unix: i64,
    pub remember: bool,
    pub csrf_token: String,
    pub csrf_issued_at_unix: i64,
}

impl SessionRecord {
    /// Build a fresh authenticated record with random identifier and CSRF
    /// token.
    ///
    /// # Errors
    /// Returns an error when the system RNG fails.
    pub fn issue(remember: bool) -> Result<Self> {
        let now = now_unix();
        Ok(Self {
            session_id: generate_token().context("failed to generate session id")?,
            created_at_unix: now,
            last_seen_at_unix: now,
            remember,
            csrf_token: generate_token().context("failed to generate CSRF token")?,
            csrf_issued_at_unix: now,
        })
    }

    /// Server-side expiry instant for the idle rule.
    #[must_use]
    pub fn expires_at_unix(&self, idle_timeout: u64, remember_lifetime: u64) -> i64 {
        let lifetime = if self.remember {
            remember_lifetime
        } else {
            idle_timeout
        };
        self.last_seen_at_unix
            .saturating_add(i64::try_from(lifetime).unwrap_or(i64::MAX))
    }

    /// A record is expired when `now` has passed the idle deadline.
    #[must_use]
    pub fn is_expired(&self, now: i64, idle_timeout: u64, remember_lifetime: u64) -> bool {
        now > self.expires_at_unix(idle_timeout, remember_lifetime)
    }

    /// CSRF tokens die with the session or after their own TTL, whichever
    /// comes first.
    #[must_use]
    pub fn csrf_expired(&self, now: i64, csrf_ttl: u64) -> bool {
        now > self
            .csrf_issued_at_unix
            .saturating_add(i64::try_from(csrf_ttl).unwrap_or(i64::MAX))
    }
}

/// 32 bytes of OS randomness, URL-safe base64 without padding.
///
/// # Errors
/// Returns an error when the system RNG fails.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to read from system RNG")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session storage deadline exceeded")]
    Timeout,
    #[error("session storage failure: {0}")]
    Other(String),
}

/// Storage interface for session records.
///
/// `load` owns the idle rule: an expired record is deleted and reported as
/// missing. Every operation maps infrastructure failure to `StoreError`,
/// which the HTTP layer surfaces as 500, never as 401.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new record; the commit must be atomic so a concurrent
    /// reader sees either the whole record or nothing.
    async fn create(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Fetch a live record. Missing, unparsable, tampered, and expired
    /// records are all reported as `None`.
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Refresh `last_seen_at`. Returns false when the record no longer
    /// exists.
    async fn touch(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Replace an existing record (CSRF rotation). Missing records are a
    /// no-op.
    async fn update(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Idempotent removal.
    async fn destroy(&self, session_id: &str) -> Result<(), StoreError>;

    /// Remove every record; used only on password change.
    async fn destroy_all(&self) -> Result<(), StoreError>;

    /// Reclaim records that have not been written for `older_than`
    /// seconds. Returns the number of records removed.
    async fn sweep(&self, older_than: u64) -> Result<usize, StoreError>;
}
