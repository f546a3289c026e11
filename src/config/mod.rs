//! Security configuration: parsed from CLI/environment once at startup,
//! validated, then frozen and shared read-only by every component.

use std::path::{Path, PathBuf};

use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::auth::verifier::valid_verifier;

pub mod env_file;

pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_WINDOW: u64 = 900;
pub const DEFAULT_SESSION_IDLE_TIMEOUT: u64 = 3_600;
pub const DEFAULT_REMEMBER_LIFETIME: u64 = 2_592_000;
pub const DEFAULT_HASH_COST: u32 = 12;
pub const DEFAULT_CSRF_TOKEN_TTL: u64 = 86_400;
pub const DEFAULT_SWEEP_INTERVAL: u64 = 3_600;

/// Minimum signing key length in bytes.
const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Baseline CSP plus the tile/icon hosts the POI map UI loads from.
const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    img-src 'self' data: https://*.tile.openstreetmap.org https://unpkg.com; \
    style-src 'self' 'unsafe-inline' https://unpkg.com; \
    script-src 'self' https://unpkg.com; \
    connect-src 'self'; \
    frame-ancestors 'none'";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SESSION_SECRET_KEY is required outside debug mode")]
    MissingSigningKey,
    #[error("SESSION_SECRET_KEY must be at least {MIN_SIGNING_KEY_BYTES} bytes")]
    SigningKeyTooShort,
    #[error("ADMIN_PASSWORD_VERIFIER is required outside debug mode")]
    MissingVerifier,
    #[error("ADMIN_PASSWORD_VERIFIER is not a bcrypt verifier string")]
    InvalidVerifier,
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("SESSION_SAMESITE must be one of strict, lax, none")]
    InvalidSameSite,
    #[error("failed to generate debug credentials: {0}")]
    DebugGeneration(String),
}

/// `SameSite` attribute stamped on the session cookie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl SameSitePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidSameSite),
        }
    }
}

/// Raw tunables as they arrive from clap/environment, before validation.
#[derive(Clone, Debug)]
pub struct Settings {
    pub signing_key: Option<String>,
    pub password_verifier: Option<String>,
    pub max_failed_attempts: u32,
    pub lockout_window: u64,
    pub session_idle_timeout: u64,
    pub remember_lifetime: u64,
    pub hash_cost: u32,
    pub csrf_token_ttl: u64,
    pub cookie_secure: bool,
    pub samesite: String,
    pub content_security_policy: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub sweep_interval: u64,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            signing_key: None,
            password_verifier: None,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_window: DEFAULT_LOCKOUT_WINDOW,
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            remember_lifetime: DEFAULT_REMEMBER_LIFETIME,
            hash_cost: DEFAULT_HASH_COST,
            csrf_token_ttl: DEFAULT_CSRF_TOKEN_TTL,
            cookie_secure: true,
            samesite: "strict".to_string(),
            content_security_policy: None,
            state_dir: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            debug: false,
        }
    }
}

/// Frozen security configuration.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    max_failed_attempts: u32,
    lockout_window: u64,
    hash_cost: u32,
    session_idle_timeout: u64,
    remember_lifetime: u64,
    csrf_token_ttl: u64,
    signing_key: SecretString,
    password_verifier: String,
    cookie_secure: bool,
    samesite: SameSitePolicy,
    state_dir: PathBuf,
    sweep_interval: u64,
    debug: bool,
    response_headers: Vec<(&'static str, String)>,
}

impl SecurityConfig {
    /// Validate raw settings into a frozen configuration.
    ///
    /// # Errors
    /// Fails when a required secret is missing outside debug mode, the
    /// verifier is not an adaptive-hash string, or a numeric tunable is
    /// outside its allowed range (fatal even in debug mode).
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        check_range(
            "MAX_LOGIN_ATTEMPTS",
            u64::from(settings.max_failed_attempts),
            3,
            10,
        )?;
        check_range("LOCKOUT_DURATION", settings.lockout_window, 300, 3_600)?;
        check_range("HASH_COST", u64::from(settings.hash_cost), 10, 15)?;
        check_range("SESSION_TIMEOUT", settings.session_idle_timeout, 300, 86_400)?;
        check_range(
            "REMEMBER_TIMEOUT",
            settings.remember_lifetime,
            3_600,
            2_592_000,
        )?;
        check_range("CSRF_TOKEN_TTL", settings.csrf_token_ttl, 300, 2_592_000)?;
        check_range("GARDI_SWEEP_INTERVAL", settings.sweep_interval, 60, 86_400)?;

        let samesite = SameSitePolicy::parse(&settings.samesite)?;

        let signing_key = match settings.signing_key {
            Some(key) if key.as_bytes().len() >= MIN_SIGNING_KEY_BYTES => SecretString::from(key),
            Some(_) => return Err(ConfigError::SigningKeyTooShort),
            None if settings.debug => {
                warn!(
                    "SESSION_SECRET_KEY missing; generating an ephemeral key. \
                     Sessions will not survive a restart. Do not run like this in production."
                );
                SecretString::from(generate_debug_key())
            }
            None => return Err(ConfigError::MissingSigningKey),
        };

        let password_verifier = match settings.password_verifier {
            Some(verifier) if valid_verifier(&verifier) => verifier,
            Some(_) => return Err(ConfigError::InvalidVerifier),
            None if settings.debug => {
                let (password, verifier) = generate_debug_verifier(settings.hash_cost)?;
                warn!(
                    "ADMIN_PASSWORD_VERIFIER missing; generated a one-off admin password: \
                     {password}. Set ADMIN_PASSWORD_VERIFIER before deploying."
                );
                verifier
            }
            None => return Err(ConfigError::MissingVerifier),
        };

        let csp = settings
            .content_security_policy
            .unwrap_or_else(|| DEFAULT_CONTENT_SECURITY_POLICY.to_string());
        let state_dir = settings
            .state_dir
            .unwrap_or_else(|| std::env::temp_dir().join("gardi-sessions"));

        Ok(Self {
            max_failed_attempts: settings.max_failed_attempts,
            lockout_window: settings.lockout_window,
            hash_cost: settings.hash_cost,
            session_idle_timeout: settings.session_idle_timeout,
            remember_lifetime: settings.remember_lifetime,
            csrf_token_ttl: settings.csrf_token_ttl,
            signing_key,
            password_verifier,
            cookie_secure: settings.cookie_secure,
            samesite,
            state_dir,
            sweep_interval: settings.sweep_interval,
            debug: settings.debug,
            response_headers: build_response_headers(&csp),
        })
    }

    /// Builder that skips range validation; the env/CLI boundary is the
    /// only validated entry point.
    #[must_use]
    pub fn builder() -> SecurityConfigBuilder {
        SecurityConfigBuilder::default()
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_window(&self) -> u64 {
        self.lockout_window
    }

    #[must_use]
    pub fn hash_cost(&self) -> u32 {
        self.hash_cost
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> u64 {
        self.session_idle_timeout
    }

    #[must_use]
    pub fn remember_lifetime(&self) -> u64 {
        self.remember_lifetime
    }

    #[must_use]
    pub fn csrf_token_ttl(&self) -> u64 {
        self.csrf_token_ttl
    }

    #[must_use]
    pub fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }

    #[must_use]
    pub fn password_verifier(&self) -> &str {
        &self.password_verifier
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn samesite(&self) -> SameSitePolicy {
        self.samesite
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn sweep_interval(&self) -> u64 {
        self.sweep_interval
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The fixed defensive header set stamped on every response.
    #[must_use]
    pub fn security_headers(&self) -> &[(&'static str, String)] {
        &self.response_headers
    }
}

fn build_response_headers(csp: &str) -> Vec<(&'static str, String)> {
    vec![
        ("X-Content-Type-Options", "nosniff".to_string()),
        ("X-Frame-Options", "DENY".to_string()),
        ("X-XSS-Protection", "1; mode=block".to_string()),
        (
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload".to_string(),
        ),
        (
            "Referrer-Policy",
            "strict-origin-when-cross-origin".to_string(),
        ),
        (
            "Permissions-Policy",
            "geolocation=(), microphone=(), camera=(), payment=()".to_string(),
        ),
        ("Content-Security-Policy", csp.to_string()),
        (
            "Cache-Control",
            "no-cache, no-store, must-revalidate".to_string(),
        ),
        ("Pragma", "no-cache".to_string()),
        ("Expires", "0".to_string()),
    ]
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            min,
            max,
            value,
        })
    }
}

fn generate_debug_key() -> String {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_debug_verifier(cost: u32) -> Result<(String, String), ConfigError> {
    let mut bytes = [0u8; 18];
    OsRng.fill_bytes(&mut bytes);
    let password = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    let verifier = bcrypt::hash(&password, cost)
        .map_err(|err| ConfigError::DebugGeneration(err.to_string()))?;
    Ok((password, verifier))
}

/// Expose the signing key bytes for signer construction.
#[must_use]
pub fn signing_key_bytes(config: &SecurityConfig) -> &[u8] {
    config.signing_key.expose_secret().as_bytes()
}

#[derive(Default)]
pub struct SecurityConfigBuilder {
    settings: Settings,
}

impl SecurityConfigBuilder {
    #[must_use]
    pub fn signing_key(mut self, key: &str) -> Self {
        self.settings.signing_key = Some(key.to_string());
        self
    }

    #[must_use]
    pub fn password_verifier(mut self, verifier: &str) -> Self {
        self.settings.password_verifier = Some(verifier.to_string());
        self
    }

    #[must_use]
    pub fn max_failed_attempts(mut self, value: u32) -> Self {
        self.settings.max_failed_attempts = value;
        self
    }

    #[must_use]
    pub fn lockout_window(mut self, seconds: u64) -> Self {
        self.settings.lockout_window = seconds;
        self
    }

    #[must_use]
    pub fn session_idle_timeout(mut self, seconds: u64) -> Self {
        self.settings.session_idle_timeout = seconds;
        self
    }

    #[must_use]
    pub fn remember_lifetime(mut self, seconds: u64) -> Self {
        self.settings.remember_lifetime = seconds;
        self
    }

    #[must_use]
    pub fn hash_cost(mut self, cost: u32) -> Self {
        self.settings.hash_cost = cost;
        self
    }

    #[must_use]
    pub fn csrf_token_ttl(mut self, seconds: u64) -> Self {
        self.settings.csrf_token_ttl = seconds;
        self
    }

    #[must_use]
    pub fn cookie_secure(mut self, secure: bool) -> Self {
        self.settings.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn samesite(mut self, policy: &str) -> Self {
        self.settings.samesite = policy.to_string();
        self
    }

    #[must_use]
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.state_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn sweep_interval(mut self, seconds: u64) -> Self {
        self.settings.sweep_interval = seconds;
        self
    }

    /// Assemble without range validation. Secrets still fall back to
    /// generated values so tests never need real credentials.
    #[must_use]
    pub fn build(self) -> SecurityConfig {
        let settings = self.settings;
        let samesite = SameSitePolicy::parse(&settings.samesite).unwrap_or(SameSitePolicy::Strict);
        let signing_key = settings
            .signing_key
            .map_or_else(|| SecretString::from(generate_debug_key()), SecretString::from);
        let password_verifier = settings.password_verifier.unwrap_or_else(|| {
            generate_debug_verifier(4).map_or_else(|_| String::new(), |(_, verifier)| verifier)
        });
        let csp = settings
            .content_security_policy
            .unwrap_or_else(|| DEFAULT_CONTENT_SECURITY_POLICY.to_string());
        let state_dir = settings
            .state_dir
            .unwrap_or_else(|| std::env::temp_dir().join("gardi-sessions"));

        SecurityConfig {
            max_failed_attempts: settings.max_failed_attempts,
            lockout_window: settings.lockout_window,
            hash_cost: settings.hash_cost,
            session_idle_timeout: settings.session_idle_timeout,
            remember_lifetime: settings.remember_lifetime,
            csrf_token_ttl: settings.csrf_token_ttl,
            signing_key,
            password_verifier,
            cookie_secure: settings.cookie_secure,
            samesite,
            state_dir,
            sweep_interval: settings.sweep_interval,
            debug: settings.debug,
            response_headers: build_response_headers(&csp),
        }
    }
}
