use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::overrides::InventoryOverrides;
use crate::error::ConnectResult;

pub const DEFAULT_SERVER_ADDRESS: &str = "https://localhost:8443";
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 120;
pub const DEFAULT_SERVER_NODE_NAME: &str = "pmm-server";
pub const ENV_PREFIX: &str = "PMM_CONNECT_";

/// Logging verbosity accepted on the command line and in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Shape of the stderr log lines. `json` suits shipping the audit trail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime settings for the connection tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub server_address: String,
    pub tls_insecure: bool,
    /// Seconds before an inventory request is abandoned.
    pub connect_timeout: u64,
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_format: LogFormat,
    pub netrc_file: PathBuf,
    pub standardise: bool,
    pub server_node_name: String,
    #[serde(default)]
    pub inventory: InventoryOverrides,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            tls_insecure: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            netrc_file: default_netrc_path(),
            standardise: false,
            server_node_name: DEFAULT_SERVER_NODE_NAME.to_string(),
            inventory: InventoryOverrides::default(),
        }
    }
}

/// Values given explicitly on the command line. Unset fields leave the
/// config file (or the default) in charge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netrc_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standardise: Option<bool>,
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_netrc_path() -> PathBuf {
    home_dir().join(".netrc")
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(".config").join("gascan").join("connect-py.json")
}

fn figment(config_path: Option<&Path>, flags: &FlagOverrides) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Json::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(flags))
}

/// Layer defaults, the JSON config file, `PMM_CONNECT_*` variables and
/// explicit flags, in that order.
///
/// A config file that cannot be parsed is skipped; the returned error is
/// handed back so the caller can report it once logging is up.
pub fn load(
    config_path: &Path,
    flags: &FlagOverrides,
) -> ConnectResult<(Settings, Option<figment::Error>)> {
    match figment(Some(config_path), flags).extract::<Settings>() {
        Ok(settings) => Ok((settings, None)),
        Err(file_error) => {
            let settings = figment(None, flags).extract::<Settings>()?;
            Ok((settings, Some(file_error)))
        }
    }
}

/// A starting point for `--config`, printed by `--sample-config`.
pub fn sample_config() -> serde_json::Value {
    serde_json::json!({
        "log_level": "warning",
        "server_address": DEFAULT_SERVER_ADDRESS,
        "tls_insecure": false,
        "inventory": {
            "source": "pmm",
            "hosts": {
                "testme": {
                    "ssh": {
                        "custom_labels": { "port": 22 }
                    }
                },
                "testmetoo": {
                    "mysql": { "port": 33060 }
                }
            }
        }
    })
}
