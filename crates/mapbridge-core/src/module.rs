//! Mapping module capability traits.
//!
//! A [`MappingModule`] is one loaded unit of translation logic bound to a
//! channel. It adapts a physical device's native property model to the
//! externally exposed accessory characteristic model; the translation logic
//! itself lives outside this crate.
//!
//! Device-event handling is an optional capability. Callers probe
//! [`MappingModule::handles_device_events`] before invoking
//! [`MappingModule::on_device_event`] instead of relying on ambient duck
//! typing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LoadResult, ModuleError, ModuleResult};
use crate::event::OnDeviceEventParams;

/// The capability set exposed by a loaded mapping module.
///
/// `on_char_read` and `on_char_update` are mandatory; `on_device_event` is
/// optional and guarded by the [`handles_device_events`] probe.
///
/// [`handles_device_events`]: MappingModule::handles_device_events
#[async_trait]
pub trait MappingModule: Send + Sync {
    /// Resolves the current value of a characteristic.
    async fn on_char_read(&self, service_tag: &str, char_tag: &str) -> ModuleResult<Value>;

    /// Applies a characteristic update to the underlying device.
    async fn on_char_update(
        &self,
        service_tag: &str,
        char_tag: &str,
        old_value: Value,
        new_value: Value,
    ) -> ModuleResult<()>;

    /// Whether this module consumes device events.
    ///
    /// Modules that return `false` (the default) are skipped during device
    /// event fan-out.
    fn handles_device_events(&self) -> bool {
        false
    }

    /// Consumes one device event.
    ///
    /// Only invoked when [`handles_device_events`] returns `true`; the
    /// default implementation reports the capability as missing.
    ///
    /// [`handles_device_events`]: MappingModule::handles_device_events
    async fn on_device_event(&self, _event: OnDeviceEventParams) -> ModuleResult<()> {
        Err(ModuleError::MissingCapability {
            method: "onDeviceEvent",
        })
    }
}

impl std::fmt::Debug for dyn MappingModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MappingModule")
    }
}

/// A shared, type-erased mapping module handle.
pub type BoxedModule = Arc<dyn MappingModule>;

/// Constructs mapping modules from URL strings.
///
/// The host treats module loading as opaque; implementations may resolve
/// URLs against registered factories, script engines, or anything else that
/// yields a [`MappingModule`].
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Loads the module the URL points at.
    async fn load(&self, url: &str) -> LoadResult<BoxedModule>;
}

/// A shared, type-erased module loader handle.
pub type BoxedLoader = Arc<dyn ModuleLoader>;
