//! Inventory blob fetcher: the disk-cached, retrying download behind
//! `get_inventory`.
//!
//! The blob is requested with the vault key, cached under the cache dir for
//! a TTL, copied to `inventory.json` and optionally passed through a reader
//! command (e.g. a vault decrypt script). Failures never propagate: the
//! caller always gets a JSON document, `{"error":1}` when nothing worked.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

use figment::providers::{Format, Json, Serialized};
use figment::Figment;
use indexmap::IndexMap;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{ConnectError, ConnectResult};

pub const CACHE_INVENTORY_FILE: &str = "inventory.cache";
pub const INVENTORY_FILE: &str = "inventory.json";
pub const ERROR_DOCUMENT: &str = r#"{"error":1}"#;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub headers: IndexMap<String, String>,
    pub key_file: Option<PathBuf>,
    pub retry_attempts: u32,
    pub retry_wait_seconds: u64,
    pub request_timeout: u64,
    pub uri: String,
    /// Invoked as `<read_command> inventory.json <key_file>`; its stdout
    /// replaces the raw blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_command: Option<String>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            headers: IndexMap::from([("Content-type".to_string(), "application/json".to_string())]),
            key_file: None,
            retry_attempts: 3,
            retry_wait_seconds: 10,
            request_timeout: 10,
            uri: "http://localhost/inventory".to_string(),
            read_command: None,
        }
    }
}

impl BlobConfig {
    pub fn load(path: &Path) -> ConnectResult<Self> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path))
            .extract()?)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("gascan")
            .join("inventory-config.json")
    }

    /// The key file, which must exist.
    pub fn key_file(&self) -> ConnectResult<&Path> {
        match &self.key_file {
            Some(path) if path.is_file() => Ok(path),
            other => {
                warn!(key_file = ?other, "unable to find, or read the key");
                Err(ConnectError::fatal("key_file should set to the path for the key"))
            }
        }
    }
}

/// TTL-bounded files under one cache directory.
#[derive(Debug, Clone)]
pub struct BlobCache {
    dir: PathBuf,
    ttl: Duration,
}

impl BlobCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    /// `GASCAN_CACHE_DIR` (default `<tmp>/.gascan`) and `GASCAN_CACHE_TTL`
    /// seconds (default 3600).
    pub fn from_env() -> Self {
        let dir = std::env::var_os("GASCAN_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(".gascan"));
        let ttl = std::env::var("GASCAN_CACHE_TTL")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(DEFAULT_CACHE_TTL, Duration::from_secs);
        Self::new(dir, ttl)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create the cache directory (mode 0700). Returns whether it was created.
    pub fn ensure_dir(&self) -> std::io::Result<bool> {
        if self.dir.is_dir() {
            return Ok(false);
        }
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir)?;
        Ok(true)
    }

    /// The cached bytes, if present and younger than the TTL.
    pub fn read_fresh(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.path(name);
        debug!(path = %path.display(), "checking cache item");

        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age > self.ttl {
            debug!(path = %path.display(), age_secs = age.as_secs(), "cache item expired");
            return None;
        }
        std::fs::read(&path)
            .inspect_err(|e| warn!(path = %path.display(), error = %e, "failed to access cache item"))
            .ok()
    }

    pub fn write(&self, name: &str, data: &[u8]) {
        let path = self.path(name);
        let result = self.ensure_dir().and_then(|_| std::fs::write(&path, data));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write cache item");
        }
    }
}

pub struct BlobFetcher {
    config: BlobConfig,
    cache: BlobCache,
    http: Client,
}

impl BlobFetcher {
    pub fn new(config: BlobConfig, cache: BlobCache) -> ConnectResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConnectError::fatal(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConnectError::fatal(format!("invalid value for header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| ConnectError::fatal(format!("building HTTP client: {e}")))?;

        Ok(Self { config, cache, http })
    }

    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    /// The inventory document, or [`ERROR_DOCUMENT`] when it could not be
    /// produced.
    pub fn fetch(&self) -> String {
        match self.try_fetch() {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "failed to read the inventory");
                ERROR_DOCUMENT.to_string()
            }
        }
    }

    fn try_fetch(&self) -> ConnectResult<String> {
        let key_file = self.config.key_file()?;
        if let Err(e) = self.cache.ensure_dir() {
            warn!(dir = %self.cache.dir().display(), error = %e, "unable to create cache dir");
        }

        let data = match self.cache.read_fresh(CACHE_INVENTORY_FILE) {
            Some(data) => {
                debug!("using cached inventory");
                data
            }
            None => {
                let key = std::fs::read_to_string(key_file).map_err(|e| {
                    ConnectError::fatal(format!("reading {}: {e}", key_file.display()))
                })?;
                let data = self.request_with_retries(&key)?;
                self.cache.write(CACHE_INVENTORY_FILE, &data);
                data
            }
        };

        let inventory = self.cache.path(INVENTORY_FILE);
        std::fs::write(&inventory, &data)
            .map_err(|e| ConnectError::fatal(format!("writing {}: {e}", inventory.display())))?;

        match &self.config.read_command {
            Some(command) => self.read_inventory(command, &inventory, key_file),
            None => String::from_utf8(data)
                .map_err(|e| ConnectError::fatal(format!("inventory is not UTF-8: {e}"))),
        }
    }

    fn request_with_retries(&self, key: &str) -> ConnectResult<Vec<u8>> {
        let attempts = self.config.retry_attempts.max(1);
        let wait = Duration::from_secs(self.config.retry_wait_seconds);
        let body = serde_json::json!({ "key": key });

        for attempt in 1..=attempts {
            debug!(attempt, uri = %self.config.uri, "requesting inventory");
            match self.http.post(&self.config.uri).json(&body).send() {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .bytes()
                        .map(|b| b.to_vec())
                        .map_err(|e| ConnectError::request(&self.config.uri, e));
                }
                Ok(resp) => error!(status = %resp.status(), attempt, "failed to request inventory"),
                Err(e) => warn!(error = %e, attempt, "failed attempt"),
            }
            if attempt < attempts {
                std::thread::sleep(wait);
            }
        }

        Err(ConnectError::request(
            &self.config.uri,
            format!("gave up after {attempts} attempts"),
        ))
    }

    fn read_inventory(&self, command: &str, inventory: &Path, key_file: &Path) -> ConnectResult<String> {
        let argv = shlex::split(command)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| ConnectError::Command(command.to_string()))?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ConnectError::Command(command.to_string()))?;

        let output = Command::new(program)
            .args(args)
            .arg(inventory)
            .arg(key_file)
            .current_dir(self.cache.dir())
            .output()
            .map_err(|source| ConnectError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConnectError::fatal(format!(
                "failed to read the inventory from disk: {} exited with {}",
                program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Printed by `get_inventory --generate-sample`.
pub fn sample_config() -> serde_json::Value {
    serde_json::json!({
        "headers": BlobConfig::default().headers,
        "key_file": null,
        "retry_attempts": 3,
        "retry_wait_seconds": 10,
        "uri": "http://localhost/inventory",
    })
}
