//! Session configuration and validation.

use super::{SyncError, SyncResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

static ENDPOINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://([^/:?#\s]*)(?::(\d+))?([/?#]\S*)?$")
        .expect("valid endpoint regex")
});

const ALLOWED_SCHEMES: [&str; 4] = ["ws", "wss", "http", "https"];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_CONFLICT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Parsed remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    raw: String,
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    /// Accepts `ws`, `wss`, `http` and `https` URLs with a non-empty host.
    pub fn parse(value: &str) -> SyncResult<Self> {
        let trimmed = value.trim();
        let captures = ENDPOINT_RE
            .captures(trimmed)
            .ok_or_else(|| SyncError::Configuration(format!("malformed endpoint `{trimmed}`")))?;

        let scheme = captures[1].to_ascii_lowercase();
        if !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
            return Err(SyncError::Configuration(format!(
                "unsupported endpoint scheme `{scheme}`"
            )));
        }

        let host = captures[2].to_string();
        if host.is_empty() {
            return Err(SyncError::Configuration("endpoint host is empty".to_string()));
        }

        let port = match captures.get(3) {
            Some(port) => Some(port.as_str().parse::<u16>().map_err(|_| {
                SyncError::Configuration(format!("endpoint port `{}` out of range", port.as_str()))
            })?),
            None => None,
        };

        Ok(Self {
            raw: trimmed.to_string(),
            scheme,
            host,
            port,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

/// Basic credentials presented to the remote on connect.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    /// Local changes go up; remote changes are never pulled.
    #[default]
    Push,
    Pull,
    PushAndPull,
}

impl SyncDirection {
    pub fn pushes(self) -> bool {
        matches!(self, Self::Push | Self::PushAndPull)
    }

    pub fn pulls(self) -> bool {
        matches!(self, Self::Pull | Self::PushAndPull)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::PushAndPull => "push_and_pull",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "push" => Some(Self::Push),
            "pull" => Some(Self::Pull),
            "push_and_pull" | "push-and-pull" | "pushandpull" | "both" => Some(Self::PushAndPull),
            _ => None,
        }
    }
}

/// Exponential reconnect delay, capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Running state of one retry sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// Delay before the next attempt; doubles each call until capped.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        self.policy
            .initial_backoff
            .saturating_mul(factor)
            .min(self.policy.max_backoff)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    pub direction: SyncDirection,
    /// `false` runs a single cycle and then stops the session.
    pub continuous: bool,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Conflict history older than this is dropped after a successful push.
    pub conflict_retention: Duration,
}

impl SyncConfig {
    /// Continuous push-only session with default timings.
    pub fn new(endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            direction: SyncDirection::default(),
            continuous: true,
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            conflict_retention: DEFAULT_CONFLICT_RETENTION,
        }
    }

    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.continuous = false;
        self
    }

    /// Checks every option and returns the parsed endpoint.
    pub fn validate(&self) -> SyncResult<Endpoint> {
        let endpoint = Endpoint::parse(&self.endpoint)?;
        if self.credentials.username.trim().is_empty() {
            return Err(SyncError::Configuration("username is empty".to_string()));
        }
        if self.credentials.password.trim().is_empty() {
            return Err(SyncError::Configuration("password is empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Configuration(
                "batch size must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::Configuration(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(SyncError::Configuration(
                "initial backoff exceeds max backoff".to_string(),
            ));
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> SyncConfig {
        SyncConfig::new(endpoint, Credentials::new("yard", "secret"))
    }

    #[test]
    fn endpoint_parse_accepts_supported_schemes() {
        let endpoint = Endpoint::parse("wss://sync.example.com:4984/yard").unwrap();
        assert_eq!(endpoint.scheme(), "wss");
        assert_eq!(endpoint.host(), "sync.example.com");
        assert_eq!(endpoint.port(), Some(4984));

        for raw in ["ws://10.0.2.2:4984/db", "http://localhost", "HTTPS://Sync.Example"] {
            assert!(Endpoint::parse(raw).is_ok(), "{raw} should parse");
        }
    }

    #[test]
    fn endpoint_parse_rejects_bad_values() {
        for raw in ["", "sync.example.com", "ftp://host/db", "ws:///db", "ws://host:99999"] {
            let err = Endpoint::parse(raw).unwrap_err();
            assert_eq!(err.code(), "configuration_error", "{raw}");
        }
    }

    #[test]
    fn validate_rejects_blank_credentials_and_bad_limits() {
        let mut blank_user = config("ws://localhost:4984/db");
        blank_user.credentials.username = "  ".to_string();
        assert!(blank_user.validate().is_err());

        let mut blank_password = config("ws://localhost:4984/db");
        blank_password.credentials.password = String::new();
        assert!(blank_password.validate().is_err());

        let mut zero_batch = config("ws://localhost:4984/db");
        zero_batch.batch_size = 0;
        assert!(zero_batch.validate().is_err());

        let mut inverted = config("ws://localhost:4984/db");
        inverted.retry.initial_backoff = Duration::from_secs(120);
        assert!(inverted.validate().is_err());

        assert!(config("ws://localhost:4984/db").validate().is_ok());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let text = format!("{:?}", Credentials::new("yard", "hunter2"));
        assert!(text.contains("yard"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn backoff_doubles_until_capped_and_resets() {
        let mut backoff = RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
        .backoff();
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn direction_flags() {
        assert!(SyncDirection::Push.pushes() && !SyncDirection::Push.pulls());
        assert!(SyncDirection::PushAndPull.pushes() && SyncDirection::PushAndPull.pulls());
        assert_eq!(SyncDirection::parse("Both"), Some(SyncDirection::PushAndPull));
        assert_eq!(SyncDirection::parse("sideways"), None);
    }
}
