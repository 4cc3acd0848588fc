/*
 * archway - Arch Linux package search and source fetch helper.
 * Copyright (C) 2025  archway contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Configuration management with validation and defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ArchwayError, ArchwayResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const SYSTEM_CONFIG: &str = "/etc/archway/archway.toml";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable colored output
    pub color: bool,

    /// Official repository settings
    pub official: OfficialConfig,

    /// AUR settings
    pub aur: AurConfig,

    /// HTTP client settings
    pub http: HttpConfig,

    /// Source fetch settings
    pub fetch: FetchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color: true,
            official: OfficialConfig::default(),
            aur: AurConfig::default(),
            http: HttpConfig::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Official repository configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OfficialConfig {
    /// Package web API root
    pub base_url: String,

    /// Architecture searched and used in payload paths
    pub arch: String,

    /// Snapshot root for core, extra and testing sources
    pub core_snapshot_url: String,

    /// Snapshot root for every other repository
    pub community_snapshot_url: String,

    /// Include testing repositories in searches
    pub testing: bool,

    /// Include multilib repositories in searches
    pub multilib: bool,
}

impl Default for OfficialConfig {
    fn default() -> Self {
        Self {
            base_url: "https://archlinux.org/packages".to_string(),
            arch: "x86_64".to_string(),
            core_snapshot_url:
                "https://projects.archlinux.org/svntogit/packages.git/snapshot/packages".to_string(),
            community_snapshot_url:
                "https://projects.archlinux.org/svntogit/community.git/snapshot/community-packages"
                    .to_string(),
            testing: false,
            multilib: false,
        }
    }
}

/// AUR-specific configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AurConfig {
    /// Site root, prefixed to snapshot paths
    pub base_url: String,

    /// AUR RPC endpoint
    pub rpc_url: String,
}

impl Default for AurConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aur.archlinux.org".to_string(),
            rpc_url: "https://aur.archlinux.org/rpc/".to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Request timeout in seconds (0 = none)
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("archway/{}", VERSION),
            timeout_secs: 0,
        }
    }
}

/// Source fetch configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Where fetched package directories are placed
    pub output_dir: PathBuf,

    /// Parent for temporary working directories (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Show a download progress bar
    pub progress: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            temp_dir: None,
            progress: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (empty = no file logging)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. /etc/archway/archway.toml (system-wide)
    /// 2. ~/.config/archway/config.toml (user)
    /// 3. Environment variables (ARCHWAY_*)
    pub fn load() -> ArchwayResult<Self> {
        let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("archway").join("config.toml"));
        }

        let config = Self::load_from(&paths)?.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Merge the files that exist among `paths`, later files taking precedence
    pub fn load_from(paths: &[PathBuf]) -> ArchwayResult<Self> {
        let mut config = Config::default();
        for path in paths {
            if path.exists() {
                config = config.merge(Self::from_file(path)?);
            }
        }
        Ok(config)
    }

    /// Parse a single TOML file
    pub fn from_file(path: &Path) -> ArchwayResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ArchwayError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let parsed = toml::from_str::<Config>(&content).map_err(|e| ArchwayError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(parsed)
    }

    /// Merge another config into this one (other takes precedence for non-default values).
    ///
    /// A value equal to its default never overrides: a later file cannot
    /// switch `official.testing` back to `false` once an earlier file set it.
    /// Use the `ARCHWAY_*` environment variables or command-line flags for that.
    fn merge(mut self, other: Config) -> Self {
        let default = Config::default();

        if other.color != default.color {
            self.color = other.color;
        }

        self.official = self.official.merge(other.official);
        self.aur = self.aur.merge(other.aur);
        self.http = self.http.merge(other.http);
        self.fetch = self.fetch.merge(other.fetch);
        self.logging = self.logging.merge(other.logging);

        self
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("ARCHWAY_OFFICIAL_URL") {
            self.official.base_url = val;
        }

        if let Ok(val) = std::env::var("ARCHWAY_AUR_URL") {
            self.aur.rpc_url = val;
        }

        if let Ok(val) = std::env::var("ARCHWAY_OUTPUT_DIR") {
            self.fetch.output_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ARCHWAY_TIMEOUT") {
            if let Ok(n) = val.parse() {
                self.http.timeout_secs = n;
            }
        }

        if let Ok(val) = std::env::var("ARCHWAY_COLOR") {
            self.color = val == "1" || val.to_lowercase() == "true";
        }

        if let Ok(val) = std::env::var("ARCHWAY_LOG_LEVEL") {
            self.logging.level = val;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ArchwayResult<()> {
        let urls = [
            ("official.base_url", &self.official.base_url),
            ("official.core_snapshot_url", &self.official.core_snapshot_url),
            ("official.community_snapshot_url", &self.official.community_snapshot_url),
            ("aur.base_url", &self.aur.base_url),
            ("aur.rpc_url", &self.aur.rpc_url),
        ];
        for (key, value) in urls {
            url::Url::parse(value).map_err(|e| ArchwayError::Config {
                message: format!("{} is not a valid URL ({}): {}", key, value, e),
            })?;
        }
        if self.official.arch.trim().is_empty() {
            return Err(ArchwayError::Config {
                message: "official.arch must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl OfficialConfig {
    fn merge(mut self, other: OfficialConfig) -> Self {
        let default = OfficialConfig::default();

        if other.base_url != default.base_url {
            self.base_url = other.base_url;
        }
        if other.arch != default.arch {
            self.arch = other.arch;
        }
        if other.core_snapshot_url != default.core_snapshot_url {
            self.core_snapshot_url = other.core_snapshot_url;
        }
        if other.community_snapshot_url != default.community_snapshot_url {
            self.community_snapshot_url = other.community_snapshot_url;
        }
        if other.testing != default.testing {
            self.testing = other.testing;
        }
        if other.multilib != default.multilib {
            self.multilib = other.multilib;
        }

        self
    }
}

impl AurConfig {
    fn merge(mut self, other: AurConfig) -> Self {
        let default = AurConfig::default();

        if other.base_url != default.base_url {
            self.base_url = other.base_url;
        }
        if other.rpc_url != default.rpc_url {
            self.rpc_url = other.rpc_url;
        }

        self
    }
}

impl HttpConfig {
    fn merge(mut self, other: HttpConfig) -> Self {
        let default = HttpConfig::default();

        if other.user_agent != default.user_agent {
            self.user_agent = other.user_agent;
        }
        if other.timeout_secs != default.timeout_secs {
            self.timeout_secs = other.timeout_secs;
        }

        self
    }
}

impl FetchConfig {
    fn merge(mut self, other: FetchConfig) -> Self {
        let default = FetchConfig::default();

        if other.output_dir != default.output_dir {
            self.output_dir = other.output_dir;
        }
        if other.temp_dir.is_some() {
            self.temp_dir = other.temp_dir;
        }
        if other.progress != default.progress {
            self.progress = other.progress;
        }

        self
    }
}

impl LoggingConfig {
    fn merge(mut self, other: LoggingConfig) -> Self {
        let default = LoggingConfig::default();

        if other.level != default.level {
            self.level = other.level;
        }
        if other.file.is_some() {
            self.file = other.file;
        }

        self
    }
}
