//! Configuration loader using figment.
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. Configuration file (`mapbridge.toml` / `mapbridge.yaml`, or a file
//!    passed explicitly)
//! 3. Environment variables (`MAPBRIDGE_*`, `__` as section separator,
//!    e.g. `MAPBRIDGE_DISPATCH__HANDLER_TIMEOUT_MS=1000`)
//! 4. Programmatic overrides via [`ConfigLoader::merge`]
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files
//! - `yaml-config`: enables YAML configuration files
//!
//! # Example
//!
//! ```rust,ignore
//! use mapbridge_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load()?;
//!
//! let config = ConfigLoader::new()
//!     .file("config/mapbridge.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BridgeConfig;

/// Base names searched for in each search path, per enabled format.
#[cfg(feature = "toml-config")]
const TOML_BASE_NAMES: &[&str] = &["mapbridge.toml", "config.toml"];
#[cfg(feature = "yaml-config")]
const YAML_BASE_NAMES: &[&str] = &["mapbridge.yaml", "mapbridge.yml"];

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    figment: Figment,
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: BridgeConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<BridgeConfig> {
        let figment = self.build_figment()?;

        let config: BridgeConfig = figment
            .extract()
            .map_err(|e| ConfigError::Extract(e.to_string()))?;

        debug!(
            logging_level = %config.logging.level,
            handler_timeout_ms = config.dispatch.handler_timeout_ms,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BridgeConfig::default()));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            figment = figment.merge(
                Env::prefixed("MAPBRIDGE_")
                    .split("__")
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
        }

        // Programmatic overrides win over everything else.
        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        Ok(figment)
    }

    /// Merges a single config file, dispatching on file extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Searches for and loads configuration files from the search paths.
    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_mut, unused_variables)
    )]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = if self.search_paths.is_empty() {
            std::env::current_dir().map(|cwd| vec![cwd]).unwrap_or_default()
        } else {
            self.search_paths.clone()
        };

        let mut found = false;
        for search_path in &search_paths {
            #[cfg(feature = "toml-config")]
            for base_name in TOML_BASE_NAMES {
                let path = search_path.join(base_name);
                if path.exists() {
                    info!(path = %path.display(), "loading configuration file");
                    figment = figment.merge(Toml::file(&path));
                    found = true;
                }
            }

            #[cfg(feature = "yaml-config")]
            for base_name in YAML_BASE_NAMES {
                let path = search_path.join(base_name);
                if path.exists() {
                    info!(path = %path.display(), "loading configuration file");
                    figment = figment.merge(Yaml::file(&path));
                    found = true;
                }
            }

            if found {
                break;
            }
        }

        if !found {
            warn!("no configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from default locations.
pub fn load_config() -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().with_current_dir().load()
}

/// Loads configuration from a specific file.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
