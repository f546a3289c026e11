use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("gardi")
        .about("Authentication and access control for a points-of-interest backend")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("GARDI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("GARDI_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        );

    let command = with_credential_args(command);
    let command = with_lockout_args(command);
    with_session_args(command)
}

fn with_credential_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-secret-key")
                .long("session-secret-key")
                .help("Signing key for session cookies and records, at least 32 bytes")
                .env("SESSION_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("password-verifier")
                .long("password-verifier")
                .help("bcrypt verifier string for the admin credential")
                .env("ADMIN_PASSWORD_VERIFIER")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("hash-cost")
                .long("hash-cost")
                .help("bcrypt cost used when rotating the credential")
                .env("HASH_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Generate missing secrets with a loud warning instead of failing")
                .env("DEBUG")
                .action(clap::ArgAction::SetTrue),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("max-login-attempts")
                .long("max-login-attempts")
                .help("Failed attempts inside the window before lockout")
                .env("MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("lockout-duration")
                .long("lockout-duration")
                .help("Lockout and failure window in seconds")
                .env("LOCKOUT_DURATION")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-timeout")
                .long("session-timeout")
                .help("Idle timeout for plain sessions, in seconds")
                .env("SESSION_TIMEOUT")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("remember-timeout")
                .long("remember-timeout")
                .help("Lifetime for remembered sessions, in seconds")
                .env("REMEMBER_TIMEOUT")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("csrf-token-ttl")
                .long("csrf-token-ttl")
                .help("CSRF token lifetime, in seconds")
                .env("CSRF_TOKEN_TTL")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("cookie-secure")
                .long("cookie-secure")
                .help("Mark the session cookie Secure")
                .env("SESSION_COOKIE_SECURE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("samesite")
                .long("samesite")
                .help("SameSite policy for the session cookie: strict, lax, none")
                .env("SESSION_SAMESITE")
                .default_value("strict"),
        )
        .arg(
            Arg::new("content-security-policy")
                .long("content-security-policy")
                .help("Override the Content-Security-Policy header value")
                .env("CONTENT_SECURITY_POLICY"),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .help("Directory for session files and .env.local (default: system temp)")
                .env("GARDI_STATE_DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("sweep-interval")
                .long("sweep-interval")
                .help("Seconds between background sweeps of expired sessions")
                .env("GARDI_SWEEP_INTERVAL")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "gardi");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Authentication and access control for a points-of-interest backend"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_defaults() {
        // Shield the assertions from whatever happens to be exported in
        // the test environment.
        temp_env::with_vars(
            [
                ("GARDI_PORT", None::<&str>),
                ("MAX_LOGIN_ATTEMPTS", None),
                ("LOCKOUT_DURATION", None),
                ("SESSION_TIMEOUT", None),
                ("REMEMBER_TIMEOUT", None),
                ("HASH_COST", None),
                ("SESSION_COOKIE_SECURE", None),
                ("SESSION_SAMESITE", None),
                ("DEBUG", None),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["gardi"]);

                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
                assert_eq!(
                    matches.get_one::<u32>("max-login-attempts").copied(),
                    Some(5)
                );
                assert_eq!(
                    matches.get_one::<u64>("lockout-duration").copied(),
                    Some(900)
                );
                assert_eq!(
                    matches.get_one::<u64>("session-timeout").copied(),
                    Some(3600)
                );
                assert_eq!(
                    matches.get_one::<u64>("remember-timeout").copied(),
                    Some(2_592_000)
                );
                assert_eq!(matches.get_one::<u32>("hash-cost").copied(), Some(12));
                assert_eq!(
                    matches.get_one::<bool>("cookie-secure").copied(),
                    Some(true)
                );
                assert_eq!(
                    matches.get_one::<String>("samesite").map(String::as_str),
                    Some("strict")
                );
                assert!(!matches.get_flag("debug"));
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("GARDI_PORT", Some("443")),
                (
                    "SESSION_SECRET_KEY",
                    Some("0123456789abcdef0123456789abcdef"),
                ),
                ("MAX_LOGIN_ATTEMPTS", Some("3")),
                ("LOCKOUT_DURATION", Some("600")),
                ("SESSION_TIMEOUT", Some("1800")),
                ("SESSION_COOKIE_SECURE", Some("false")),
                ("GARDI_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["gardi"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>("session-secret-key")
                        .map(String::as_str),
                    Some("0123456789abcdef0123456789abcdef")
                );
                assert_eq!(
                    matches.get_one::<u32>("max-login-attempts").copied(),
                    Some(3)
                );
                assert_eq!(
                    matches.get_one::<u64>("lockout-duration").copied(),
                    Some(600)
                );
                assert_eq!(
                    matches.get_one::<u64>("session-timeout").copied(),
                    Some(1800)
                );
                assert_eq!(
                    matches.get_one::<bool>("cookie-secure").copied(),
                    Some(false)
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("GARDI_LOG_LEVEL", Some(level))], || {
                let command = new();
                let matches = command.get_matches_from(vec!["gardi"]);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("GARDI_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["gardi".to_string()];
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();
                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }
}
