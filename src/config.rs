// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::env as env_vars;
use crate::error::{Result, SyncError};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Agent configuration loaded from a YAML file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// host:port of the secret service
    pub server: String,
    pub ca_file: PathBuf,
    /// Root under which every client gets its own directory
    pub secrets_directory: PathBuf,
    /// Directory holding the per-client YAML files
    pub client_directory: PathBuf,
    #[serde(default)]
    pub default_user: String,
    #[serde(default)]
    pub default_group: String,
    /// Refuse to write secrets unless the target is on this filesystem (tmpfs or ramfs)
    #[serde(default)]
    pub fs_type: Option<String>,
    #[serde(default)]
    pub chown_files: bool,
    /// Empty or absent means a single pass
    #[serde(default)]
    pub poll_interval: Option<String>,
}

/// Configuration of one identity talking to the secret service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub key: PathBuf,
    pub cert: PathBuf,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub group: String,
    /// Directory name under `secrets_directory`
    pub directory: String,
}

/// Where the orchestrator gets the current set of clients from
pub trait ClientConfigSource: Send + Sync {
    fn load_clients(&self) -> Result<BTreeMap<String, ClientConfig>>;
}

impl Config {
    /// Load configuration from the file named by SECRETSYNC_CONFIG
    pub fn from_env() -> Result<Self> {
        let path = env::var(env_vars::CONFIG_PATH).map_err(|_| {
            SyncError::Config(format!("{} environment variable not set", env_vars::CONFIG_PATH))
        })?;
        Self::from_file(path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| SyncError::io("Failed to read config", path, e))?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|e| {
            SyncError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(fs_type) = &self.fs_type {
            if !matches!(fs_type.as_str(), "tmpfs" | "ramfs") {
                return Err(SyncError::Config(format!(
                    "Unsupported fs_type '{}', expected tmpfs or ramfs",
                    fs_type
                )));
            }
        }
        self.poll_interval()?;
        self.server_url()?;
        Ok(())
    }

    /// Parsed poll interval, `None` when the agent should run a single pass
    pub fn poll_interval(&self) -> Result<Option<Duration>> {
        match self.poll_interval.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_duration(raw).map(Some),
        }
    }

    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&format!("https://{}/", self.server))
            .map_err(|e| SyncError::Config(format!("Failed parsing server '{}': {}", self.server, e)))
    }
}

impl ClientConfigSource for Config {
    /// Merge every YAML file in the client directory into one map
    fn load_clients(&self) -> Result<BTreeMap<String, ClientConfig>> {
        let dir = &self.client_directory;
        let entries =
            fs::read_dir(dir).map_err(|e| SyncError::io("Failed to read client directory", dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SyncError::io("Failed to read client directory", dir, e))?
                .path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut clients = BTreeMap::new();
        for path in files {
            let raw = fs::read_to_string(&path)
                .map_err(|e| SyncError::io("Failed to read client config", &path, e))?;
            let parsed: BTreeMap<String, ClientConfig> = serde_yaml::from_str(&raw).map_err(|e| {
                SyncError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            debug!("Loaded {} clients from {}", parsed.len(), path.display());

            for (name, client) in parsed {
                if clients.insert(name.clone(), client).is_some() {
                    return Err(SyncError::Config(format!(
                        "Client '{}' defined more than once (last seen in {})",
                        name,
                        path.display()
                    )));
                }
            }
        }
        Ok(clients)
    }
}

/// Parse an interval such as "30s", "5m", "1h" or "1d"
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let pattern = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| SyncError::Config(format!("Failed to compile duration regex: {e}")))?;

    let lower = trimmed.to_lowercase();
    let captures = pattern.captures(&lower).ok_or_else(|| {
        SyncError::Config(format!(
            "Couldn't parse poll interval '{}', expected <number><unit> (e.g. '30s', '5m', '1h')",
            trimmed
        ))
    })?;

    let number: u64 = captures["number"]
        .parse()
        .map_err(|e| SyncError::Config(format!("Invalid poll interval '{}': {}", trimmed, e)))?;
    if number == 0 {
        return Err(SyncError::Config(format!(
            "Poll interval must be greater than 0, got '{}'",
            trimmed
        )));
    }

    let multiplier = match &captures["unit"] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86400,
    };
    number
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| SyncError::Config(format!("Poll interval '{}' is too large", trimmed)))
}
