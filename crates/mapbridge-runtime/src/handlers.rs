//! Event handlers and the name-keyed handler set.
//!
//! Each handler answers to one dispatch key (the event's type tag with the
//! first letter folded to lower case) and owns producing its response: on
//! success the dispatcher does nothing further, on failure the dispatcher
//! converts the error into an `ErrorResp`.
//!
//! `onDeviceEvent` is the deliberate exception: it is a fire-and-forget
//! broadcast and never produces a response.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use mapbridge_core::{EventChannel, InboundEvent, MsgId, Response};

use crate::error::{DispatchError, DispatchResult};
use crate::registry::{DeviceBindings, ModuleRegistry};

/// Shared state handed to every handler invocation.
pub struct HandlerContext {
    /// Channel-to-module registry.
    pub registry: Arc<ModuleRegistry>,
    /// Device-to-channel bindings.
    pub bindings: Arc<DeviceBindings>,
}

/// One named dispatch operation.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The dispatch key this handler answers to.
    fn name(&self) -> &'static str;

    /// Processes one event.
    ///
    /// A successful handler has already sent any response it owes through
    /// `channel`; an error return is converted by the dispatcher into an
    /// `ErrorResp` for `msg_id`.
    async fn handle(
        &self,
        ctx: &HandlerContext,
        channel: &dyn EventChannel,
        msg_id: MsgId,
        event: InboundEvent,
    ) -> DispatchResult<()>;
}

impl std::fmt::Debug for dyn EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Loads (or reuses) the mapping module for a channel.
pub struct ExecuteSideModule;

#[async_trait]
impl EventHandler for ExecuteSideModule {
    fn name(&self) -> &'static str {
        "executeSideModule"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        channel: &dyn EventChannel,
        msg_id: MsgId,
        event: InboundEvent,
    ) -> DispatchResult<()> {
        let InboundEvent::ExecuteSideModule(params) = event else {
            return Err(DispatchError::EventMismatch {
                handler: self.name(),
            });
        };

        ctx.registry
            .get_or_load(params.ch_id, &params.url)
            .await
            .map_err(|source| DispatchError::Load {
                ch_id: params.ch_id,
                source,
            })?;

        channel
            .send_response(msg_id, Response::execute_module(params.ch_id))
            .await?;
        Ok(())
    }
}

/// Appends a device/channel binding.
pub struct BindDeviceModule;

#[async_trait]
impl EventHandler for BindDeviceModule {
    fn name(&self) -> &'static str {
        "bindDeviceModule"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        channel: &dyn EventChannel,
        msg_id: MsgId,
        event: InboundEvent,
    ) -> DispatchResult<()> {
        let InboundEvent::BindDeviceModule(params) = event else {
            return Err(DispatchError::EventMismatch {
                handler: self.name(),
            });
        };

        ctx.bindings.bind(params.ch_id, &params.dev_id);

        channel
            .send_response(msg_id, Response::BindDeviceModuleResp)
            .await?;
        Ok(())
    }
}

/// Resolves a characteristic read through the channel's module.
pub struct OnCharRead;

#[async_trait]
impl EventHandler for OnCharRead {
    fn name(&self) -> &'static str {
        "onCharRead"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        channel: &dyn EventChannel,
        msg_id: MsgId,
        event: InboundEvent,
    ) -> DispatchResult<()> {
        let InboundEvent::OnCharRead(params) = event else {
            return Err(DispatchError::EventMismatch {
                handler: self.name(),
            });
        };

        let module = ctx
            .registry
            .get(params.ch_id)
            .ok_or(DispatchError::ModuleNotFound { ch_id: params.ch_id })?;

        let value = module
            .on_char_read(&params.service_tag, &params.char_tag)
            .await?;

        channel
            .send_response(msg_id, Response::CharReadResp { value })
            .await?;
        Ok(())
    }
}

/// Propagates a characteristic update through the channel's module.
pub struct OnCharUpdate;

#[async_trait]
impl EventHandler for OnCharUpdate {
    fn name(&self) -> &'static str {
        "onCharUpdate"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        channel: &dyn EventChannel,
        msg_id: MsgId,
        event: InboundEvent,
    ) -> DispatchResult<()> {
        let InboundEvent::OnCharUpdate(params) = event else {
            return Err(DispatchError::EventMismatch {
                handler: self.name(),
            });
        };

        let module = ctx
            .registry
            .get(params.ch_id)
            .ok_or(DispatchError::ModuleNotFound { ch_id: params.ch_id })?;

        module
            .on_char_update(
                &params.service_tag,
                &params.char_tag,
                params.old_value,
                params.new_value,
            )
            .await?;

        channel
            .send_response(msg_id, Response::CharUpdateResp)
            .await?;
        Ok(())
    }
}

/// Broadcasts a device event to every channel bound to the device.
///
/// Fire-and-forget: no response is produced, and a failure in one module
/// never stops fan-out to the remaining channels.
pub struct OnDeviceEvent;

#[async_trait]
impl EventHandler for OnDeviceEvent {
    fn name(&self) -> &'static str {
        "onDeviceEvent"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        _channel: &dyn EventChannel,
        _msg_id: MsgId,
        event: InboundEvent,
    ) -> DispatchResult<()> {
        let InboundEvent::OnDeviceEvent(params) = event else {
            return Err(DispatchError::EventMismatch {
                handler: self.name(),
            });
        };

        for ch_id in ctx.bindings.channels(&params.dev_id) {
            let Some(module) = ctx.registry.get(ch_id) else {
                warn!(ch_id, dev_id = %params.dev_id, "device bound to channel without a loaded module");
                continue;
            };

            if !module.handles_device_events() {
                continue;
            }

            if let Err(e) = module.on_device_event(params.clone()).await {
                error!(ch_id, dev_id = %params.dev_id, error = %e, "device event handler failed");
            }
        }

        Ok(())
    }
}

// =============================================================================
// Handler Set
// =============================================================================

/// The set of registered handlers, keyed by dispatch key.
pub struct HandlerSet {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl HandlerSet {
    /// Creates an empty handler set.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a handler set with all built-in handlers registered.
    pub fn with_defaults() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(ExecuteSideModule));
        set.register(Arc::new(BindDeviceModule));
        set.register(Arc::new(OnCharRead));
        set.register(Arc::new(OnCharUpdate));
        set.register(Arc::new(OnDeviceEvent));
        set
    }

    /// Registers a handler under its dispatch key, replacing any previous
    /// handler with the same key.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Resolves the handler for a dispatch key.
    pub fn resolve(&self, key: &str) -> DispatchResult<Arc<dyn EventHandler>> {
        self.handlers
            .get(key)
            .cloned()
            .ok_or_else(|| DispatchError::HandlerNotFound {
                key: key.to_string(),
            })
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("keys", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_dispatch_keys() {
        let set = HandlerSet::with_defaults();
        assert_eq!(set.len(), 5);

        for key in [
            "executeSideModule",
            "bindDeviceModule",
            "onCharRead",
            "onCharUpdate",
            "onDeviceEvent",
        ] {
            assert!(set.resolve(key).is_ok(), "missing handler for {key}");
        }
    }

    #[test]
    fn test_unknown_key_is_handler_not_found() {
        let set = HandlerSet::with_defaults();
        let err = set.resolve("onFirmwareUpdate").unwrap_err();
        assert!(matches!(err, DispatchError::HandlerNotFound { .. }));
    }
}
