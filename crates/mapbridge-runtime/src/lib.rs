//! Mapbridge Runtime - Engine layer for the mapbridge dispatch framework.
//!
//! This crate provides:
//! - The event dispatch loop (`Dispatcher`) and built-in handlers
//! - Lazy, single-flight module loading (`ModuleRegistry`)
//! - Device-to-channel bindings (`DeviceBindings`)
//! - The host-side channel with request/response correlation (`HostClient`)
//! - Configuration loading and logging setup
//!
//! The usual entry point is the engine builder:
//!
//! ```ignore
//! use std::sync::Arc;
//! use mapbridge_runtime::engine::MappingEngine;
//! use mapbridge_runtime::loader::FactoryModuleLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = FactoryModuleLoader::new().with_factory("switch", switch_factory);
//!
//!     let engine = MappingEngine::builder()
//!         .loader(Arc::new(loader))
//!         .init_logging()
//!         .build()?;
//!
//!     let (client, endpoint) = engine.channel();
//!     let task = tokio::spawn(async move { engine.run(Arc::new(endpoint)).await });
//!
//!     // Hand `client` to the host side; events flow from here on.
//!     // Dropping the client closes the channel and stops the engine.
//!     drop(client);
//!     task.await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod loader;
pub mod logging;
pub mod registry;

// Re-exports
pub use channel::{EngineEndpoint, HostClient, host_channel};
pub use config::{BridgeConfig, ConfigError, ConfigLoader, ConfigResult, DispatchConfig};
pub use dispatcher::Dispatcher;
pub use engine::{EngineBuilder, MappingEngine};
pub use error::{DispatchError, DispatchResult, RuntimeError, RuntimeResult};
pub use handlers::{EventHandler, HandlerContext, HandlerSet};
pub use loader::FactoryModuleLoader;
pub use logging::LoggingBuilder;
pub use registry::{DeviceBindings, ModuleRegistry};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};

    pub use super::engine::MappingEngine;
    pub use super::handlers::{EventHandler, HandlerContext};
    pub use super::loader::FactoryModuleLoader;
}
