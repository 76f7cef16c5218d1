//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Upstream connection settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Console debugger settings
    #[serde(default)]
    pub gdb: GdbConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream (IDE side) settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Address of the IDE or DBGP proxy to dial
    #[serde(default = "default_dial")]
    pub dial: String,

    /// Application id reported in the init handshake
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Largest framed message accepted from the peer
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dial: default_dial(),
            app_id: default_app_id(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_dial() -> String {
    "localhost:9000".to_string()
}
fn default_app_id() -> String {
    "dbgp-gateway".to_string()
}
fn default_max_message_bytes() -> usize {
    10 * 1024 * 1024
}

/// Console debugger settings
#[derive(Debug, Deserialize, Clone)]
pub struct GdbConfig {
    /// Debugger executable, looked up in PATH when not absolute
    #[serde(default = "default_gdb_path")]
    pub path: PathBuf,

    /// Extra arguments passed before the target
    #[serde(default)]
    pub args: Vec<String>,

    /// Idle time after the last console line before output is considered complete
    #[serde(default = "default_idle_window_ms")]
    pub idle_window_ms: u64,

    /// Interactive prompt stripped from console lines
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Console commands issued once while initializing
    #[serde(default = "default_setup")]
    pub setup: Vec<String>,
}

impl Default for GdbConfig {
    fn default() -> Self {
        Self {
            path: default_gdb_path(),
            args: Vec::new(),
            idle_window_ms: default_idle_window_ms(),
            prompt: default_prompt(),
            setup: default_setup(),
        }
    }
}

impl GdbConfig {
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    /// Resolve the debugger executable
    ///
    /// Absolute or relative paths are used as-is, bare names are searched in PATH
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if self.path.components().count() > 1 {
            return Ok(self.path.clone());
        }
        which::which(&self.path).map_err(|e| Error::DebuggerNotFound {
            name: self.path.display().to_string(),
            searched: format!("PATH ({e})"),
        })
    }
}

fn default_gdb_path() -> PathBuf {
    PathBuf::from("gdb")
}
fn default_idle_window_ms() -> u64 {
    100
}
fn default_prompt() -> String {
    "(gdb) ".to_string()
}
fn default_setup() -> Vec<String> {
    [
        "set confirm off",
        "set pagination off",
        "set width 0",
        "set height 0",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Log output settings
#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if no file exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => config_path().filter(|p| p.exists()),
        };
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}
