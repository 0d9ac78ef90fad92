use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the account name.
pub const USERNAME_ENV: &str = "ATERNOS_USERNAME";
/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "ATERNOS_PASSWORD";

/// Account credentials used for the browser-style login.
///
/// The password is never printed by the `Debug` implementation.
///
/// # Examples
///
/// ```
/// use aternos_controller::config::Credentials;
///
/// let credentials = Credentials::new("steve", "hunter2");
/// assert!(!format!("{:?}", credentials).contains("hunter2"));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name typed into the login form.
    pub username: String,
    /// Account password typed into the login form.
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

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// URLs of the remote console.
///
/// Every page the controller touches is derived from these; server control
/// pages are always `base_url + "/server/" + identifier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    /// Site root, used to absolutize relative links.
    pub base_url: String,
    /// Home page carrying the signup/login promotional section.
    pub home_url: String,
    /// Login entry point; its path is the initialization canary.
    pub login_url: String,
    /// Page listing the account's servers.
    pub server_list_url: String,
}

impl Endpoints {
    /// Derive the conventional endpoint layout from a site root.
    pub fn for_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            base_url: base.to_string(),
            home_url: format!("{}/:en/", base),
            login_url: format!("{}/go/", base),
            server_list_url: format!("{}/server/", base),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_base("https://aternos.org")
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// Total attempts per request, including the first one.
    pub max_retries: u32,
    /// Fixed pause between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Whole-request timeout of the HTTP client, in seconds.
    pub timeout_secs: u64,
    /// Connect timeout of the HTTP client, in seconds.
    pub connect_timeout_secs: u64,
}

impl TransportConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 5_000,
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Fixed pauses the remote service needs between steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    /// Wait after submitting credentials before verifying the login.
    pub settle_delay_ms: u64,
    /// Wait after hitting a start/stop control before looking for a confirmation.
    pub action_delay_ms: u64,
    /// Cooldown the action queue observes after every action.
    pub queue_cooldown_ms: u64,
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    pub fn queue_cooldown(&self) -> Duration {
        Duration::from_millis(self.queue_cooldown_ms)
    }

    /// All pauses set to zero. Handy for tests against local servers.
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            action_delay_ms: 0,
            queue_cooldown_ms: 0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2_000,
            action_delay_ms: 2_000,
            queue_cooldown_ms: 5_000,
        }
    }
}

/// Main configuration for the controller.
///
/// # JSON Schema
///
/// Only `credentials` is required; every other section falls back to its
/// defaults.
///
/// ```json
/// {
///   "credentials": { "username": "steve", "password": "hunter2" },
///   "endpoints": {
///     "baseUrl": "https://aternos.org",
///     "homeUrl": "https://aternos.org/:en/",
///     "loginUrl": "https://aternos.org/go/",
///     "serverListUrl": "https://aternos.org/server/"
///   },
///   "transport": { "maxRetries": 3, "retryDelayMs": 5000 },
///   "timing": { "settleDelayMs": 2000, "actionDelayMs": 2000, "queueCooldownMs": 5000 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account to log in with.
    pub credentials: Credentials,
    /// Remote console URLs.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// HTTP retry and timeout settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Fixed delays between steps.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Configuration with default endpoints, transport and timing.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoints: Endpoints::default(),
            transport: TransportConfig::default(),
            timing: TimingConfig::default(),
        }
    }

    /// Replace the endpoints.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replace the transport settings.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the timing settings.
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::parse_from_yaml_str(&content)
        } else {
            Self::parse_from_str(&content)
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Builds a configuration from `ATERNOS_USERNAME` and `ATERNOS_PASSWORD`.
    ///
    /// Endpoints, transport and timing keep their defaults.
    pub fn from_env() -> Result<Self> {
        let username = read_env(USERNAME_ENV)?;
        let password = read_env(PASSWORD_ENV)?;
        Ok(Self::new(Credentials::new(username, password)))
    }
}

fn read_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(Error::ConfigInvalid(format!("{} is empty", key))),
        Err(_) => Err(Error::ConfigInvalid(format!("{} is not set", key))),
    }
}
