use crate::cli::actions::Action;
use crate::config::Settings;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let settings = Settings {
        signing_key: matches.get_one::<String>("session-secret-key").cloned(),
        password_verifier: matches.get_one::<String>("password-verifier").cloned(),
        max_failed_attempts: matches
            .get_one::<u32>("max-login-attempts")
            .copied()
            .unwrap_or(crate::config::DEFAULT_MAX_FAILED_ATTEMPTS),
        lockout_window: matches
            .get_one::<u64>("lockout-duration")
            .copied()
            .unwrap_or(crate::config::DEFAULT_LOCKOUT_WINDOW),
        session_idle_timeout: matches
            .get_one::<u64>("session-timeout")
            .copied()
            .unwrap_or(crate::config::DEFAULT_SESSION_IDLE_TIMEOUT),
        remember_lifetime: matches
            .get_one::<u64>("remember-timeout")
            .copied()
            .unwrap_or(crate::config::DEFAULT_REMEMBER_LIFETIME),
        hash_cost: matches
            .get_one::<u32>("hash-cost")
            .copied()
            .unwrap_or(crate::config::DEFAULT_HASH_COST),
        csrf_token_ttl: matches
            .get_one::<u64>("csrf-token-ttl")
            .copied()
            .unwrap_or(crate::config::DEFAULT_CSRF_TOKEN_TTL),
        cookie_secure: matches.get_one::<bool>("cookie-secure").copied().unwrap_or(true),
        samesite: matches
            .get_one::<String>("samesite")
            .cloned()
            .unwrap_or_else(|| "strict".to_string()),
        content_security_policy: matches.get_one::<String>("content-security-policy").cloned(),
        state_dir: matches.get_one::<std::path::PathBuf>("state-dir").cloned(),
        sweep_interval: matches
            .get_one::<u64>("sweep-interval")
            .copied()
            .unwrap_or(crate::config::DEFAULT_SWEEP_INTERVAL),
        debug: matches.get_flag("debug"),
    };

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        settings,
    })
}
