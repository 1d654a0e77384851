//! Engine assembly and lifecycle.
//!
//! [`MappingEngine`] wires the module registry, device bindings, handler set
//! and dispatcher together behind a builder:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mapbridge_runtime::engine::MappingEngine;
//! use mapbridge_runtime::loader::FactoryModuleLoader;
//!
//! let loader = FactoryModuleLoader::new().with_factory("switch", switch_factory);
//!
//! let engine = MappingEngine::builder()
//!     .loader(Arc::new(loader))
//!     .build()?;
//!
//! let (client, endpoint) = engine.channel();
//! tokio::spawn(async move { engine.run(Arc::new(endpoint)).await });
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use mapbridge_core::{BoxedChannel, BoxedLoader};

use crate::channel::{EngineEndpoint, HostClient, host_channel};
use crate::config::{self, BridgeConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{RuntimeError, RuntimeResult};
use crate::handlers::{EventHandler, HandlerContext, HandlerSet};
use crate::logging;
use crate::registry::{DeviceBindings, ModuleRegistry};

/// The assembled event dispatch engine.
pub struct MappingEngine {
    config: BridgeConfig,
    registry: Arc<ModuleRegistry>,
    bindings: Arc<DeviceBindings>,
    dispatcher: Dispatcher,
}

impl MappingEngine {
    /// Returns a builder for configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The effective configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The channel-to-module registry.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// The device-to-channel bindings.
    pub fn bindings(&self) -> &Arc<DeviceBindings> {
        &self.bindings
    }

    /// Creates a host/engine channel pair sized and timed per the
    /// configuration.
    ///
    /// The [`HostClient`] goes to the host side; the [`EngineEndpoint`] is
    /// what [`run`](Self::run) consumes.
    pub fn channel(&self) -> (HostClient, EngineEndpoint) {
        let (client, endpoint) = host_channel(self.config.dispatch.channel_capacity);
        let client = client.with_request_timeout(self.config.dispatch.request_timeout());
        (client, endpoint)
    }

    /// Runs the dispatch loop over `channel` until it closes.
    pub async fn run(&self, channel: BoxedChannel) {
        info!(
            handler_timeout_ms = self.config.dispatch.handler_timeout_ms,
            "engine started"
        );
        self.dispatcher.run(channel).await;
        info!("engine stopped");
    }
}

impl std::fmt::Debug for MappingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// Builder for [`MappingEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<BridgeConfig>,
    config_file: Option<PathBuf>,
    loader: Option<BoxedLoader>,
    extra_handlers: Vec<Arc<dyn EventHandler>>,
    init_logging: bool,
}

impl EngineBuilder {
    /// Creates a builder with no configuration sources set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an already-loaded configuration instead of loading one.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads configuration from the given file.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the module loader. Required.
    pub fn loader(mut self, loader: BoxedLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Registers an additional handler on top of the built-in set.
    ///
    /// A handler with the same dispatch key as a built-in one replaces it.
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.extra_handlers.push(handler);
        self
    }

    /// Initializes logging from the resolved configuration during
    /// [`build`](Self::build).
    pub fn init_logging(mut self) -> Self {
        self.init_logging = true;
        self
    }

    /// Builds the engine.
    ///
    /// Fails if no loader was supplied or if configuration loading fails.
    pub fn build(self) -> RuntimeResult<MappingEngine> {
        let config = match (self.config, self.config_file) {
            (Some(config), _) => config,
            (None, Some(path)) => config::load_config_from_file(path)?,
            (None, None) => config::load_config()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let loader = self.loader.ok_or(RuntimeError::MissingLoader)?;

        let registry = Arc::new(ModuleRegistry::new(loader));
        let bindings = Arc::new(DeviceBindings::new());
        let ctx = Arc::new(HandlerContext {
            registry: Arc::clone(&registry),
            bindings: Arc::clone(&bindings),
        });

        let mut handlers = HandlerSet::with_defaults();
        for handler in self.extra_handlers {
            handlers.register(handler);
        }

        let dispatcher = Dispatcher::new(
            Arc::new(handlers),
            ctx,
            config.dispatch.handler_timeout(),
        );

        Ok(MappingEngine {
            config,
            registry,
            bindings,
            dispatcher,
        })
    }
}
