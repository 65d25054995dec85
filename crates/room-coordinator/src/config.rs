//! Room Coordinator configuration.
//!
//! Configuration is loaded from environment variables. The token endpoint may
//! embed credentials and is redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default quiet period before the silence watchdog ends the audio session.
pub const DEFAULT_SILENCE_TIMEOUT_SECONDS: u64 = 30;

/// Default presence resync window.
pub const DEFAULT_PRESENCE_THROTTLE_MS: u64 = 3000;

/// Default bound on the access token request.
pub const DEFAULT_TOKEN_TIMEOUT_SECONDS: u64 = 10;

/// Default bound on opening the audio transport.
pub const DEFAULT_TRANSPORT_OPEN_TIMEOUT_SECONDS: u64 = 15;

/// Default capacity of the audio event broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Who may close a room once its roster is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomClosePolicy {
    /// Whoever leaves last closes the room.
    #[default]
    LastOneOut,
    /// Only the room creator's leave closes the room.
    CreatorOnly,
}

impl RoomClosePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "last_one_out" => Some(RoomClosePolicy::LastOneOut),
            "creator_only" => Some(RoomClosePolicy::CreatorOnly),
            _ => None,
        }
    }
}

/// Room Coordinator configuration.
#[derive(Clone)]
pub struct Config {
    /// Quiet period before an all-muted session is disconnected (default: 30s).
    pub silence_timeout: Duration,

    /// Minimum spacing between change-feed driven resyncs (default: 3s).
    pub presence_throttle: Duration,

    /// Bound on the access token request (default: 10s).
    pub token_timeout: Duration,

    /// Bound on opening the transport connection (default: 15s).
    pub transport_open_timeout: Duration,

    /// Capacity of the audio event broadcast channel (default: 256).
    pub event_buffer: usize,

    /// Room close rule applied on leave (default: last one out).
    pub close_policy: RoomClosePolicy,

    /// Token-issuing endpoint, if the embedding app wires one from config.
    /// Protected by `SecretString` because it may carry an API key.
    pub token_function_url: Option<SecretString>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("silence_timeout", &self.silence_timeout)
            .field("presence_throttle", &self.presence_throttle)
            .field("token_timeout", &self.token_timeout)
            .field("transport_open_timeout", &self.transport_open_timeout)
            .field("event_buffer", &self.event_buffer)
            .field("close_policy", &self.close_policy)
            .field(
                "token_function_url",
                &self.token_function_url.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silence_timeout: Duration::from_secs(DEFAULT_SILENCE_TIMEOUT_SECONDS),
            presence_throttle: Duration::from_millis(DEFAULT_PRESENCE_THROTTLE_MS),
            token_timeout: Duration::from_secs(DEFAULT_TOKEN_TIMEOUT_SECONDS),
            transport_open_timeout: Duration::from_secs(DEFAULT_TRANSPORT_OPEN_TIMEOUT_SECONDS),
            event_buffer: DEFAULT_EVENT_BUFFER,
            close_policy: RoomClosePolicy::default(),
            token_function_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let silence_timeout = Duration::from_secs(parse_positive(
            vars,
            "RC_SILENCE_TIMEOUT_SECONDS",
            DEFAULT_SILENCE_TIMEOUT_SECONDS,
        )?);

        let presence_throttle = Duration::from_millis(parse_positive(
            vars,
            "RC_PRESENCE_THROTTLE_MS",
            DEFAULT_PRESENCE_THROTTLE_MS,
        )?);

        let token_timeout = Duration::from_secs(parse_positive(
            vars,
            "RC_TOKEN_TIMEOUT_SECONDS",
            DEFAULT_TOKEN_TIMEOUT_SECONDS,
        )?);

        let transport_open_timeout = Duration::from_secs(parse_positive(
            vars,
            "RC_TRANSPORT_OPEN_TIMEOUT_SECONDS",
            DEFAULT_TRANSPORT_OPEN_TIMEOUT_SECONDS,
        )?);

        let event_buffer = usize::try_from(parse_positive(
            vars,
            "RC_EVENT_BUFFER",
            DEFAULT_EVENT_BUFFER as u64,
        )?)
        .map_err(|_| ConfigError::InvalidValue("RC_EVENT_BUFFER is too large".to_string()))?;

        let close_policy = match vars.get("RC_ROOM_CLOSE_POLICY") {
            Some(raw) => RoomClosePolicy::parse(raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "RC_ROOM_CLOSE_POLICY must be last_one_out or creator_only, got {raw:?}"
                ))
            })?,
            None => RoomClosePolicy::default(),
        };

        let token_function_url = vars
            .get("RC_TOKEN_FUNCTION_URL")
            .filter(|url| !url.is_empty())
            .map(|url| SecretString::from(url.clone()));

        Ok(Config {
            silence_timeout,
            presence_throttle,
            token_timeout,
            transport_open_timeout,
            event_buffer,
            close_policy,
            token_function_url,
        })
    }
}

/// Parse an optional positive integer variable, falling back to `default`.
fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{name} must be a number, got {raw:?}")))?;

    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}
