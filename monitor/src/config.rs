//! Configuration module for Intiwatch Monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `INTIWATCH_USERNAME` | Yes | - | Platform account e-mail |
//! | `INTIWATCH_PASSWORD` | Yes | - | Platform account password |
//! | `INTIWATCH_TOTP_SECRET` | No | - | Base32 TOTP seed (required if 2FA is enabled) |
//! | `INTIWATCH_WEBHOOK_URL` | Yes | - | Chat webhook URL |
//! | `INTIWATCH_WEBHOOK_TYPE` | No | `slack` | Webhook provider (`slack` or `discord`) |
//! | `INTIWATCH_TICK_SECS` | No | 60 | Seconds between polls |
//! | `INTIWATCH_SEND_LAST` | No | 0 | Activities replayed on the first tick |
//! | `INTIWATCH_WEBHOOK_RATE` | No | 2 | Webhook sends per second |
//! | `INTIWATCH_APP_URL` | No | `https://app.intigriti.com` | Platform web app |
//! | `INTIWATCH_LOGIN_URL` | No | `https://login.intigriti.com` | Identity provider |
//! | `INTIWATCH_API_URL` | No | `https://app.intigriti.com/api/core/researcher` | Researcher API |
//!
//! # Example
//!
//! ```no_run
//! use intiwatch_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Polling every {:?}", config.tick);
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

/// Default polling interval in seconds.
const DEFAULT_TICK_SECS: u64 = 60;

/// Default webhook sends per second.
const DEFAULT_WEBHOOK_RATE: f64 = 2.0;

/// Default platform web application URL.
pub const DEFAULT_APP_URL: &str = "https://app.intigriti.com";

/// Default identity provider URL.
pub const DEFAULT_LOGIN_URL: &str = "https://login.intigriti.com";

/// Default researcher API URL.
pub const DEFAULT_API_URL: &str = "https://app.intigriti.com/api/core/researcher";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Chat provider the webhook URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WebhookProvider {
    #[default]
    Slack,
    Discord,
}

impl FromStr for WebhookProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slack" => Ok(Self::Slack),
            "discord" => Ok(Self::Discord),
            other => Err(format!("expected 'slack' or 'discord', got '{other}'")),
        }
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slack => f.write_str("slack"),
            Self::Discord => f.write_str("discord"),
        }
    }
}

/// Account credentials for the platform login flow.
///
/// Password and TOTP seed are wiped from memory on drop and never appear in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account e-mail address.
    pub username: String,
    password: Zeroizing<String>,
    totp_secret: Option<Zeroizing<String>>,
}

impl Credentials {
    /// Creates credentials from plain values. An empty TOTP seed counts as absent.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        totp_secret: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            totp_secret: totp_secret
                .filter(|s| !s.trim().is_empty())
                .map(Zeroizing::new),
        }
    }

    /// Returns the account password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the TOTP seed, if one was configured.
    #[must_use]
    pub fn totp_secret(&self) -> Option<&str> {
        self.totp_secret.as_deref().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("totp_secret", &self.totp_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Base URLs of the platform surfaces the monitor talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Web application (dashboard and OIDC callbacks).
    pub app_url: String,
    /// Identity provider (login form).
    pub login_url: String,
    /// Researcher API base.
    pub api_url: String,
}

impl Endpoints {
    /// Creates endpoints, trimming trailing slashes.
    #[must_use]
    pub fn new(app_url: &str, login_url: &str, api_url: &str) -> Self {
        Self {
            app_url: app_url.trim_end_matches('/').to_string(),
            login_url: login_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Points every surface at one base URL. Used by tests against a single mock server.
    #[must_use]
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self::new(base, base, &format!("{base}/api"))
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_APP_URL, DEFAULT_LOGIN_URL, DEFAULT_API_URL)
    }
}

/// Configuration for the Intiwatch Monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Platform account credentials.
    pub credentials: Credentials,

    /// Platform base URLs.
    pub endpoints: Endpoints,

    /// Webhook receiving the notifications.
    pub webhook_url: String,

    /// Payload shape expected by the webhook.
    pub webhook_provider: WebhookProvider,

    /// Webhook sends allowed per second.
    pub webhook_rate: f64,

    /// Interval between polls.
    pub tick: Duration,

    /// Number of already-seen activities replayed on the first tick.
    pub send_last: usize,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `INTIWATCH_USERNAME`, `INTIWATCH_PASSWORD` or `INTIWATCH_WEBHOOK_URL` is not set
    /// - A numeric variable cannot be parsed or is out of range
    /// - `INTIWATCH_WEBHOOK_TYPE` names an unknown provider
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = required("INTIWATCH_USERNAME")?;
        let password = required("INTIWATCH_PASSWORD")?;
        let webhook_url = required("INTIWATCH_WEBHOOK_URL")?;
        let totp_secret = env::var("INTIWATCH_TOTP_SECRET").ok();

        let webhook_provider = match env::var("INTIWATCH_WEBHOOK_TYPE") {
            Ok(val) => val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "INTIWATCH_WEBHOOK_TYPE".to_string(),
                message,
            })?,
            Err(_) => WebhookProvider::default(),
        };

        // Optional: INTIWATCH_TICK_SECS (default: 60, must be >= 1)
        let tick_secs = match env::var("INTIWATCH_TICK_SECS") {
            Ok(val) => {
                let secs = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "INTIWATCH_TICK_SECS".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "INTIWATCH_TICK_SECS".to_string(),
                        message: "tick must be at least 1 second".to_string(),
                    });
                }
                secs
            }
            Err(_) => DEFAULT_TICK_SECS,
        };

        let send_last = match env::var("INTIWATCH_SEND_LAST") {
            Ok(val) => val.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                key: "INTIWATCH_SEND_LAST".to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            })?,
            Err(_) => 0,
        };

        let webhook_rate = match env::var("INTIWATCH_WEBHOOK_RATE") {
            Ok(val) => {
                let rate = val.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                    key: "INTIWATCH_WEBHOOK_RATE".to_string(),
                    message: format!("expected positive number, got '{val}'"),
                })?;
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(ConfigError::InvalidValue {
                        key: "INTIWATCH_WEBHOOK_RATE".to_string(),
                        message: "rate must be greater than 0".to_string(),
                    });
                }
                rate
            }
            Err(_) => DEFAULT_WEBHOOK_RATE,
        };

        let endpoints = Endpoints::new(
            &env::var("INTIWATCH_APP_URL").unwrap_or_else(|_| DEFAULT_APP_URL.to_string()),
            &env::var("INTIWATCH_LOGIN_URL").unwrap_or_else(|_| DEFAULT_LOGIN_URL.to_string()),
            &env::var("INTIWATCH_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        );

        Ok(Self {
            credentials: Credentials::new(username, password, totp_secret),
            endpoints,
            webhook_url,
            webhook_provider,
            webhook_rate,
            tick: Duration::from_secs(tick_secs),
            send_last,
        })
    }
}

/// Reads a required, non-empty environment variable.
fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all INTIWATCH_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("INTIWATCH_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("INTIWATCH_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    fn set_required() {
        env::set_var("INTIWATCH_USERNAME", "hunter@example.com");
        env::set_var("INTIWATCH_PASSWORD", "hunter2");
        env::set_var("INTIWATCH_WEBHOOK_URL", "https://hooks.slack.com/services/T/B/X");
    }

    #[test]
    #[serial]
    fn test_missing_username() {
        with_clean_env(|| {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "INTIWATCH_USERNAME"));
        });
    }

    #[test]
    #[serial]
    fn test_missing_webhook_url() {
        with_clean_env(|| {
            env::set_var("INTIWATCH_USERNAME", "hunter@example.com");
            env::set_var("INTIWATCH_PASSWORD", "hunter2");

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingEnvVar(ref s) if s == "INTIWATCH_WEBHOOK_URL")
            );
        });
    }

    #[test]
    #[serial]
    fn test_minimal_config() {
        with_clean_env(|| {
            set_required();

            let config = Config::from_env().expect("should parse minimal config");

            assert_eq!(config.credentials.username, "hunter@example.com");
            assert_eq!(config.credentials.password(), "hunter2");
            assert!(config.credentials.totp_secret().is_none());
            assert_eq!(config.webhook_provider, WebhookProvider::Slack);
            assert_eq!(config.tick, Duration::from_secs(DEFAULT_TICK_SECS));
            assert_eq!(config.send_last, 0);
            assert_eq!(config.endpoints, Endpoints::default());
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            set_required();
            env::set_var("INTIWATCH_TOTP_SECRET", "JBSW Y3DP EHPK 3PXP");
            env::set_var("INTIWATCH_WEBHOOK_TYPE", "Discord");
            env::set_var("INTIWATCH_TICK_SECS", "15");
            env::set_var("INTIWATCH_SEND_LAST", "3");
            env::set_var("INTIWATCH_WEBHOOK_RATE", "0.5");
            env::set_var("INTIWATCH_APP_URL", "https://app.test/");
            env::set_var("INTIWATCH_LOGIN_URL", "https://login.test");
            env::set_var("INTIWATCH_API_URL", "https://app.test/api//");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.credentials.totp_secret(), Some("JBSW Y3DP EHPK 3PXP"));
            assert_eq!(config.webhook_provider, WebhookProvider::Discord);
            assert_eq!(config.tick, Duration::from_secs(15));
            assert_eq!(config.send_last, 3);
            assert!((config.webhook_rate - 0.5).abs() < f64::EPSILON);
            assert_eq!(config.endpoints.app_url, "https://app.test");
            assert_eq!(config.endpoints.api_url, "https://app.test/api");
        });
    }

    #[test]
    #[serial]
    fn test_zero_tick_rejected() {
        with_clean_env(|| {
            set_required();
            env::set_var("INTIWATCH_TICK_SECS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "INTIWATCH_TICK_SECS" && message.contains("at least 1 second")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_unknown_provider_rejected() {
        with_clean_env(|| {
            set_required();
            env::set_var("INTIWATCH_WEBHOOK_TYPE", "teams");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "INTIWATCH_WEBHOOK_TYPE"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_blank_totp_secret_is_absent() {
        with_clean_env(|| {
            set_required();
            env::set_var("INTIWATCH_TOTP_SECRET", "   ");

            let config = Config::from_env().expect("should parse config");
            assert!(config.credentials.totp_secret().is_none());
        });
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials::new("a@b.c", "s3cret", Some("SEED".to_string()));
        let debug = format!("{creds:?}");
        assert!(debug.contains("a@b.c"));
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("SEED"));
    }

    #[test]
    fn test_single_host_endpoints() {
        let endpoints = Endpoints::single_host("http://127.0.0.1:9000/");
        assert_eq!(endpoints.app_url, "http://127.0.0.1:9000");
        assert_eq!(endpoints.login_url, "http://127.0.0.1:9000");
        assert_eq!(endpoints.api_url, "http://127.0.0.1:9000/api");
    }
}
