//! # Mapbridge Core
//!
//! Boundary types and traits for the mapbridge event dispatch engine.
//!
//! The mapbridge system routes events from a device-management host to
//! per-channel mapping modules, each translating between a physical IoT
//! device's native property model and an externally exposed accessory
//! characteristic model. This crate defines the seams that the engine in
//! `mapbridge-runtime` is built against:
//!
//! - **Event vocabulary**: [`InboundEvent`] and its parameter records, plus
//!   the [`ChannelId`]/[`DeviceId`]/[`MsgId`] identifier types.
//! - **Response protocol**: [`Response`] payloads, at most one per accepted
//!   message id.
//! - **Module capability**: [`MappingModule`] with an explicit optional
//!   device-event capability, and [`ModuleLoader`] for URL-keyed loading.
//! - **Host channel contract**: [`EventChannel`].
//! - **Error taxonomy**: [`ModuleLoadError`], [`ModuleError`],
//!   [`ChannelError`].
//!
//! ## Data flow
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌─────────────────┐
//! │ EventChannel │────▶│ Dispatcher │────▶│   HandlerSet    │
//! │    (host)    │◀────│ (runtime)  │     │ registry/binding│
//! └──────────────┘     └────────────┘     └────────┬────────┘
//!                                                  ▼
//!                                          ┌───────────────┐
//!                                          │ MappingModule │
//!                                          └───────────────┘
//! ```

pub mod channel;
pub mod error;
pub mod event;
pub mod module;
pub mod response;

pub use channel::{BoxedChannel, EventChannel};
pub use error::{
    ChannelError, ChannelResult, LoadResult, ModuleError, ModuleLoadError, ModuleResult,
};
pub use event::{
    BindDeviceModuleParams, ChannelId, DeviceId, ExecuteSideModuleParams, InboundEvent, MsgId,
    OnCharReadParams, OnCharUpdateParams, OnDeviceEventParams,
};
pub use module::{BoxedLoader, BoxedModule, MappingModule, ModuleLoader};
pub use response::Response;

/// Prelude for common imports.
pub mod prelude {
    pub use super::channel::{BoxedChannel, EventChannel};
    pub use super::error::{ChannelError, ModuleError, ModuleLoadError};
    pub use super::event::{ChannelId, DeviceId, InboundEvent, MsgId};
    pub use super::module::{BoxedLoader, BoxedModule, MappingModule, ModuleLoader};
    pub use super::response::Response;
}
