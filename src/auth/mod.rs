//! Authentication core: credential verification, the failed-attempt
//! ledger, and session management.
//!
//! One `AuthCore` value is constructed at startup and handed to the HTTP
//! server; there is no module-level mutable state. Handlers hold it behind
//! an `Arc` extension and drive every privileged decision through it.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use anyhow::{Context, Result};
use axum::http::HeaderMap;
use tracing::error;

use crate::config::{env_file, SecurityConfig};

pub mod ledger;
pub mod password;
pub mod session;
pub mod token;
pub mod verifier;

pub use ledger::{AttemptLedger, Decision};
pub use session::{SessionRecord, SessionStore, StoreError};
pub use token::TokenSigner;
pub use verifier::CredentialVerifier;

/// Name of the cookie carrying the signed session identifier.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Seconds since the Unix epoch.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

pub struct AuthCore {
    config: Arc<SecurityConfig>,
    verifier: RwLock<CredentialVerifier>,
    ledger: Arc<AttemptLedger>,
    sessions: Arc<dyn SessionStore>,
    signer: TokenSigner,
}

impl AuthCore {
    #[must_use]
    pub fn new(config: Arc<SecurityConfig>, sessions: Arc<dyn SessionStore>) -> Self {
        let verifier = CredentialVerifier::new(config.password_verifier().to_string());
        let ledger = AttemptLedger::new(config.max_failed_attempts(), config.lockout_window());
        let signer = TokenSigner::new(config.signing_key());
        Self {
            config,
            verifier: RwLock::new(verifier),
            ledger: Arc::new(ledger),
            sessions,
            signer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &AttemptLedger {
        &self.ledger
    }

    /// Shared handle for the background sweeper.
    #[must_use]
    pub fn ledger_handle(&self) -> Arc<AttemptLedger> {
        Arc::clone(&self.ledger)
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Check a candidate password against the current verifier. The hash
    /// is CPU-bound, so it runs on the blocking pool; the constant-time
    /// property of the verifier is preserved.
    pub async fn verify_password(&self, candidate: &str) -> bool {
        let verifier = self.current_verifier();
        let candidate = candidate.to_string();
        match tokio::task::spawn_blocking(move || verifier.verify(&candidate)).await {
            Ok(matched) => matched,
            Err(err) => {
                error!("Password verification task failed: {err}");
                false
            }
        }
    }

    /// Rotate the admin credential: hash the new password, persist the
    /// verifier to `.env.local` (rename commit), swap it in memory, then
    /// destroy every session. No session may outlive the credential it
    /// was born under.
    ///
    /// # Errors
    /// Returns an error when hashing or persistence fails; the in-memory
    /// verifier is only swapped after the new one is durably committed.
    pub async fn rotate_password(&self, new_password: &str) -> Result<()> {
        let cost = self.config.hash_cost();
        let plaintext = new_password.to_string();
        let rotated =
            tokio::task::spawn_blocking(move || CredentialVerifier::rehash(&plaintext, cost))
                .await
                .context("password hashing task failed")?
                .context("failed to hash new password")?;

        let path = env_file::env_file_path(self.config.state_dir());
        env_file::update_var(&path, "ADMIN_PASSWORD_VERIFIER", &rotated)
            .await
            .context("failed to persist rotated verifier")?;

        {
            let mut guard = self
                .verifier
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *guard = CredentialVerifier::new(rotated);
        }

        self.sessions
            .destroy_all()
            .await
            .context("failed to invalidate sessions after password change")?;
        Ok(())
    }

    /// Resolve the session presented in the request headers, if any.
    /// Missing cookie, bad signature, and expired records all read as
    /// `None`; only infrastructure failure is an error.
    ///
    /// # Errors
    /// Returns `StoreError` when session storage fails.
    pub async fn session_from_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let Some(signed) = extract_session_cookie(headers) else {
            return Ok(None);
        };
        let Some(session_id) = self.signer.unsign(&signed) else {
            return Ok(None);
        };
        self.sessions.load(&session_id).await
    }

    /// Create and persist a fresh session record.
    ///
    /// # Errors
    /// Returns an error when token generation or storage fails.
    pub async fn issue_session(&self, remember: bool) -> Result<SessionRecord> {
        let record = SessionRecord::issue(remember)?;
        self.sessions
            .create(&record)
            .await
            .context("failed to persist new session")?;
        Ok(record)
    }

    /// Constant-time CSRF check against the token bound to `record`,
    /// honoring the token TTL.
    #[must_use]
    pub fn csrf_matches(&self, record: &SessionRecord, presented: &str) -> bool {
        if record.csrf_expired(now_unix(), self.config.csrf_token_ttl()) {
            return false;
        }
        token::constant_time_eq(record.csrf_token.as_bytes(), presented.as_bytes())
    }

    fn current_verifier(&self) -> CredentialVerifier {
        self.verifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Pull the raw signed session value out of the `Cookie` header.
#[must_use]
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}
