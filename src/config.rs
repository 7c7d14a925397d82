//! Telnet session and fleet configuration.
//!
//! Defaults match what the managed switches tolerate: a slow, throttled
//! terminal on port 23 with a 15 second response window.

use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default telnet port.
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Default window for connecting and for each command response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Delay after each character written to the device.
pub const CHARACTER_SPACING: Duration = Duration::from_millis(100);

/// Extra delay after each newline written to the device.
pub const LINE_SPACING: Duration = Duration::from_millis(100);

/// Total attempts for a command, including the first one.
pub const MAX_COMMAND_ATTEMPTS: usize = 3;

/// Default number of devices contacted concurrently.
pub const DEFAULT_POOL_WIDTH: usize = 25;

/// Timeout for file transfers started on the device.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// File name prefix of persisted discovery state.
pub const DISCOVER_FILE_PREFIX: &str = "discover-";

/// Line terminator sent to devices.
pub const NEWLINE: &str = "\n";

/// Shared login credentials for every device of a fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
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

/// Per-session timing and retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionOptions {
    /// Connect timeout and default per-command response timeout.
    #[serde(with = "duration_ms")]
    #[schemars(with = "u64")]
    pub response_timeout: Duration,
    #[serde(with = "duration_ms")]
    #[schemars(with = "u64")]
    pub character_spacing: Duration,
    #[serde(with = "duration_ms")]
    #[schemars(with = "u64")]
    pub line_spacing: Duration,
    pub max_attempts: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            character_spacing: CHARACTER_SPACING,
            line_spacing: LINE_SPACING,
            max_attempts: MAX_COMMAND_ATTEMPTS,
        }
    }
}

impl SessionOptions {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets both throttling delays. Zero disables throttling.
    pub fn with_spacing(mut self, character: Duration, line: Duration) -> Self {
        self.character_spacing = character;
        self.line_spacing = line;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// Configuration of a discovery/dispatch context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FleetConfig {
    pub port: u16,
    pub credentials: Credentials,
    /// Number of devices contacted concurrently.
    pub pool_width: usize,
    /// Directory holding `discover-<seed>.json` files.
    pub state_dir: PathBuf,
    /// Devices that are never contacted.
    pub blacklist: Vec<String>,
    pub session: SessionOptions,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TELNET_PORT,
            credentials: Credentials::default(),
            pool_width: DEFAULT_POOL_WIDTH,
            state_dir: PathBuf::from("."),
            blacklist: Vec::new(),
            session: SessionOptions::default(),
        }
    }
}

impl FleetConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_pool_width(mut self, width: usize) -> Self {
        self.pool_width = width.max(1);
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_blacklist<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = devices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_expectations() {
        let cfg = FleetConfig::default();
        assert_eq!(cfg.port, 23);
        assert_eq!(cfg.pool_width, 25);
        assert_eq!(cfg.session.response_timeout, Duration::from_secs(15));
        assert_eq!(cfg.session.max_attempts, 3);
    }

    #[test]
    fn fleet_config_loads_from_partial_json() {
        let cfg: FleetConfig = serde_json::from_str(
            r#"{"credentials":{"username":"admin","password":"secret"},"pool_width":40,"session":{"response_timeout":5000}}"#,
        )
        .expect("decode config");

        assert_eq!(cfg.credentials, Credentials::new("admin", "secret"));
        assert_eq!(cfg.pool_width, 40);
        assert_eq!(cfg.port, DEFAULT_TELNET_PORT);
        assert_eq!(cfg.session.response_timeout, Duration::from_secs(5));
        assert_eq!(cfg.session.character_spacing, CHARACTER_SPACING);
    }

    #[test]
    fn builders_clamp_degenerate_values() {
        let cfg = FleetConfig::default().with_pool_width(0);
        assert_eq!(cfg.pool_width, 1);
        let opts = SessionOptions::default().with_max_attempts(0);
        assert_eq!(opts.max_attempts, 1);
    }
}
