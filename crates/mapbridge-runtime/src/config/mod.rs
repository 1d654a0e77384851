//! Configuration loading and schema.
//!
//! Configuration is layered from defaults, an optional file, environment
//! variables and programmatic overrides. See [`ConfigLoader`] for details.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{BridgeConfig, DispatchConfig, LogFormat, LoggingConfig};
