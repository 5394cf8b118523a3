//! Configuration shared by the debug server and the controller
//!
//! Settings live in a TOML file, by default
//! `<config dir>/gnk-debug/config.toml`. Every field has a default so a
//! missing file, or a file that only sets a few keys, is valid.
//!
//! ```toml
//! [server]
//! port = 24242
//! initial_state = "running"
//! pause_timeout_secs = 600
//! on_disconnect = "abort"
//!
//! [client]
//! connect_attempts = 10
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 24242;
const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Where the interpreter starts when the script begins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    /// Break before the first statement
    #[default]
    StepInto,
    /// Run until a breakpoint or a pause request
    Running,
}

/// What a paused interpreter does when its controller goes away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep running the script without a debugger attached
    #[default]
    Resume,
    /// Stop the script
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub initial_state: InitialState,
    /// Granularity of the wait loop while paused
    pub poll_interval_ms: u64,
    /// Give up on a pause after this long without any controller request
    pub pause_timeout_secs: Option<u64>,
    pub on_disconnect: DisconnectPolicy,
    /// Reject unknown request types instead of treating them as `run`
    pub strict_decoding: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            initial_state: InitialState::default(),
            poll_interval_ms: 100,
            pause_timeout_secs: None,
            on_disconnect: DisconnectPolicy::default(),
            strict_decoding: false,
        }
    }
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn pause_timeout(&self) -> Option<Duration> {
        self.pause_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_attempts: usize,
    /// First retry delay, doubled on every further attempt
    pub connect_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_attempts: 5,
            connect_backoff_ms: 200,
        }
    }
}

impl Config {
    /// Default location of the config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gnk-debug").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> eyre::Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => {
                tracing::warn!("cannot determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .wrap_err_with(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err("creating config directory")?;
        }
        let contents = toml::to_string_pretty(self).wrap_err("serialising config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("writing config file {}", path.display()))
    }
}
