//! Event vocabulary exchanged with the device-management host.
//!
//! The host pushes `(MsgId, InboundEvent)` pairs into the engine. Every
//! event is a tagged record whose `type` field names the variant; field
//! names are camelCase on the wire to stay compatible with the host
//! protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of one logical mapping channel (one active module binding).
pub type ChannelId = i64;

/// Identifier of a physical device, stable across its lifetime.
pub type DeviceId = String;

/// Correlation token between one request and its single response.
///
/// Unique among currently in-flight requests; the host allocates these.
pub type MsgId = u64;

// ============================================================================
// Event Parameters
// ============================================================================

/// Parameters for loading a mapping module onto a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSideModuleParams {
    /// The channel the module will be bound to.
    pub ch_id: ChannelId,
    /// Location the module is loaded from.
    ///
    /// Ignored when the channel already holds a module: the first load wins.
    pub url: String,
}

/// Parameters for binding a device to a channel for event fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindDeviceModuleParams {
    /// The channel to append to the device's binding list.
    pub ch_id: ChannelId,
    /// The device whose events should reach the channel's module.
    pub dev_id: DeviceId,
}

/// Parameters for reading an accessory characteristic through a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnCharReadParams {
    /// The channel whose module resolves the read.
    pub ch_id: ChannelId,
    /// Tag of the service the characteristic belongs to.
    pub service_tag: String,
    /// Tag of the characteristic being read.
    pub char_tag: String,
}

/// Parameters for propagating a characteristic update through a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnCharUpdateParams {
    /// The channel whose module applies the update.
    pub ch_id: ChannelId,
    /// Tag of the service the characteristic belongs to.
    pub service_tag: String,
    /// Tag of the characteristic being updated.
    pub char_tag: String,
    /// Value before the update.
    pub old_value: Value,
    /// Value after the update.
    pub new_value: Value,
}

/// Parameters for broadcasting a device event to its bound channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDeviceEventParams {
    /// The device the event originated from.
    pub dev_id: DeviceId,
    /// Opaque event payload forwarded to each interested module.
    #[serde(default)]
    pub payload: Value,
}

// ============================================================================
// Inbound Event
// ============================================================================

/// An event accepted from the host runtime.
///
/// Serialized with a `type` tag matching the variant name, e.g.
///
/// ```json
/// { "type": "ExecuteSideModule", "chId": 1, "url": "builtin://switch" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// Load (or reuse) the mapping module for a channel.
    ExecuteSideModule(ExecuteSideModuleParams),
    /// Bind a device to a channel for device-event fan-out.
    BindDeviceModule(BindDeviceModuleParams),
    /// Resolve a characteristic read through the channel's module.
    OnCharRead(OnCharReadParams),
    /// Propagate a characteristic update through the channel's module.
    OnCharUpdate(OnCharUpdateParams),
    /// Broadcast a device event to every channel bound to the device.
    OnDeviceEvent(OnDeviceEventParams),
}

impl InboundEvent {
    /// Returns the wire-level type tag of this event.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::ExecuteSideModule(_) => "ExecuteSideModule",
            Self::BindDeviceModule(_) => "BindDeviceModule",
            Self::OnCharRead(_) => "OnCharRead",
            Self::OnCharUpdate(_) => "OnCharUpdate",
            Self::OnDeviceEvent(_) => "OnDeviceEvent",
        }
    }

    /// Derives the dispatch key for this event.
    ///
    /// The key is the type tag with its first character folded to lower
    /// case (`"ExecuteSideModule"` → `"executeSideModule"`), matching how
    /// the host names handlers.
    pub fn handler_key(&self) -> String {
        let tag = self.type_tag();
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}
