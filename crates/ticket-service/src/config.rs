//! Ticket service configuration.
//!
//! Configuration is loaded from environment variables. The JWT secret is
//! redacted in Debug output.

use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default per-session outbound mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default hub coordinator queue capacity.
pub const DEFAULT_HUB_QUEUE_CAPACITY: usize = 1000;

/// Default liveness probe period in seconds.
pub const DEFAULT_PING_INTERVAL_SECONDS: u64 = 54;

/// Default maximum peer silence in seconds before teardown.
pub const DEFAULT_LIVENESS_TIMEOUT_SECONDS: u64 = 60;

/// Default per-frame write deadline in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECONDS: u64 = 10;

/// Default maximum inbound frame size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 512;

/// Default JWT clock skew leeway in seconds.
pub const DEFAULT_JWT_LEEWAY_SECONDS: u64 = 60;

/// Minimum accepted length of the HS256 secret.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Session timing and sizing knobs, cloned into every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub mailbox_capacity: usize,
    pub ping_interval: Duration,
    pub liveness_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECONDS),
            liveness_timeout: Duration::from_secs(DEFAULT_LIVENESS_TIMEOUT_SECONDS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECONDS),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Ticket service configuration.
#[derive(Clone)]
pub struct Config {
    /// HS256 secret used to verify bearer credentials.
    pub jwt_secret: SecretString,

    /// Listener address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Hub coordinator queue bound.
    pub hub_queue_capacity: usize,

    pub session: SessionConfig,

    /// Clock skew tolerance for `exp`/`nbf`/`iat`.
    pub jwt_leeway_seconds: u64,

    /// Sleep between readiness going false and the listener closing.
    pub drain_seconds: u64,

    /// Emit logs as JSON instead of the human-readable format.
    pub log_json: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("hub_queue_capacity", &self.hub_queue_capacity)
            .field("session", &self.session)
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("drain_seconds", &self.drain_seconds)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

fn positive<T: PartialOrd + Default>(key: &str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue(format!("{key} must be greater than zero")))
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// `MissingEnvVar` if `TICKET_JWT_SECRET` is unset. `InvalidValue` if a
    /// value does not parse, the secret is shorter than 32 bytes, a capacity
    /// or timeout is zero, or the ping interval is not below the liveness
    /// timeout.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = SecretString::from(
            vars.get("TICKET_JWT_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("TICKET_JWT_SECRET".to_string()))?
                .clone(),
        );
        if jwt_secret.expose_secret().len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "TICKET_JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }

        let bind_address = vars
            .get("TICKET_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let mailbox_capacity = positive(
            "TICKET_MAILBOX_CAPACITY",
            parse_or(vars, "TICKET_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?,
        )?;
        let hub_queue_capacity = positive(
            "TICKET_HUB_QUEUE_CAPACITY",
            parse_or(vars, "TICKET_HUB_QUEUE_CAPACITY", DEFAULT_HUB_QUEUE_CAPACITY)?,
        )?;
        let ping_interval_seconds = positive(
            "TICKET_PING_INTERVAL_SECONDS",
            parse_or(
                vars,
                "TICKET_PING_INTERVAL_SECONDS",
                DEFAULT_PING_INTERVAL_SECONDS,
            )?,
        )?;
        let liveness_timeout_seconds = positive(
            "TICKET_LIVENESS_TIMEOUT_SECONDS",
            parse_or(
                vars,
                "TICKET_LIVENESS_TIMEOUT_SECONDS",
                DEFAULT_LIVENESS_TIMEOUT_SECONDS,
            )?,
        )?;
        let write_timeout_seconds = positive(
            "TICKET_WRITE_TIMEOUT_SECONDS",
            parse_or(
                vars,
                "TICKET_WRITE_TIMEOUT_SECONDS",
                DEFAULT_WRITE_TIMEOUT_SECONDS,
            )?,
        )?;
        let max_message_bytes = positive(
            "TICKET_MAX_MESSAGE_BYTES",
            parse_or(vars, "TICKET_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?,
        )?;

        if ping_interval_seconds >= liveness_timeout_seconds {
            return Err(ConfigError::InvalidValue(
                "TICKET_PING_INTERVAL_SECONDS must be less than TICKET_LIVENESS_TIMEOUT_SECONDS"
                    .to_string(),
            ));
        }

        let jwt_leeway_seconds =
            parse_or(vars, "TICKET_JWT_LEEWAY_SECONDS", DEFAULT_JWT_LEEWAY_SECONDS)?;
        let drain_seconds = parse_or(vars, "TICKET_DRAIN_SECONDS", 0)?;
        let log_json = parse_or(vars, "TICKET_LOG_JSON", false)?;

        Ok(Config {
            jwt_secret,
            bind_address,
            hub_queue_capacity,
            session: SessionConfig {
                mailbox_capacity,
                ping_interval: Duration::from_secs(ping_interval_seconds),
                liveness_timeout: Duration::from_secs(liveness_timeout_seconds),
                write_timeout: Duration::from_secs(write_timeout_seconds),
                max_message_bytes,
            },
            jwt_leeway_seconds,
            drain_seconds,
            log_json,
        })
    }
}
