//! # Mapbridge
//!
//! An event dispatch and module-registry layer bridging a device-management
//! host to per-channel IoT mapping modules.
//!
//! ## Overview
//!
//! A host manages devices that expose typed characteristics on logical
//! channels. Each channel is served by a *mapping module* that translates
//! between the host's characteristic model and the device's native protocol.
//! Mapbridge sits between the two: it receives host events over a channel,
//! correlates requests with responses, lazily loads modules on first use, and
//! fans device events out to every channel bound to the originating device.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ (msg_id, event) ┌────────────┐ resolve ┌────────────────────┐
//! │   Host   │────────────────▶│ Dispatcher │────────▶│ Handler (own task) │
//! │ (client) │◀────────────────│            │         │  ├─ ModuleRegistry │
//! └──────────┘ (msg_id, resp)  └────────────┘         │  └─ DeviceBindings │
//!                                                     └─────────┬──────────┘
//!                                                               ▼
//!                                                      MappingModule (per channel)
//! ```
//!
//! - **HostClient / EngineEndpoint**: the correlated request/response channel
//! - **Dispatcher**: resolves events to handlers and runs each in its own task
//! - **ModuleRegistry**: one lazily-loaded module per channel, single-flight
//! - **DeviceBindings**: device-to-channel fan-out for device-originated events
//! - **MappingModule**: user-implemented per-channel translation logic
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mapbridge::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = FactoryModuleLoader::new()
//!         .with_factory("switch", |url| Ok(Arc::new(SwitchModule::from_url(url)?) as _));
//!
//!     let engine = MappingEngine::builder()
//!         .loader(Arc::new(loader))
//!         .init_logging()
//!         .build()?;
//!
//!     let (client, endpoint) = engine.channel();
//!     tokio::spawn(async move { engine.run(Arc::new(endpoint)).await });
//!
//!     let resp = client
//!         .request(InboundEvent::ExecuteSideModule(ExecuteSideModuleParams {
//!             ch_id: 1,
//!             url: "builtin://switch?siid=2".to_string(),
//!         }))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files

pub use mapbridge_core as core;
pub use mapbridge_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mapbridge::prelude::*;
/// ```
pub mod prelude {
    // Engine - main entry point
    pub use mapbridge_runtime::engine::{EngineBuilder, MappingEngine};

    // Host-side channel
    pub use mapbridge_runtime::channel::{EngineEndpoint, HostClient, host_channel};

    // Module loading
    pub use mapbridge_runtime::loader::FactoryModuleLoader;
    pub use mapbridge_runtime::registry::{DeviceBindings, ModuleRegistry};

    // Extension points
    pub use mapbridge_runtime::handlers::{EventHandler, HandlerContext, HandlerSet};

    // Configuration
    pub use mapbridge_runtime::config::{BridgeConfig, ConfigLoader};

    // Boundary types
    pub use mapbridge_core::channel::{BoxedChannel, EventChannel};
    pub use mapbridge_core::error::{ChannelError, ModuleError, ModuleLoadError};
    pub use mapbridge_core::event::{
        BindDeviceModuleParams, ChannelId, DeviceId, ExecuteSideModuleParams, InboundEvent, MsgId,
        OnCharReadParams, OnCharUpdateParams, OnDeviceEventParams,
    };
    pub use mapbridge_core::module::{BoxedLoader, BoxedModule, MappingModule, ModuleLoader};
    pub use mapbridge_core::response::Response;
}
