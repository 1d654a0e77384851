//! Response payloads returned to the host runtime.
//!
//! Every accepted request receives at most one response, keyed by its
//! [`MsgId`](crate::event::MsgId). The payload's `type` tag is determined by
//! the handler that processed the request, or by the generic error path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::ChannelId;

/// A response record delivered back through the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// A mapping module is loaded and bound to the channel.
    ///
    /// The channel id is stringified on the wire; the host protocol
    /// transported it as a string and existing peers depend on that.
    ExecuteModuleResp {
        #[serde(rename = "chId")]
        ch_id: String,
    },
    /// A device/channel binding was recorded.
    BindDeviceModuleResp,
    /// A characteristic read resolved to a value.
    CharReadResp {
        /// The value produced by the module.
        value: Value,
    },
    /// A characteristic update was applied.
    CharUpdateResp,
    /// The request failed; `error` carries the failure message.
    ErrorResp { error: String },
}

impl Response {
    /// Builds a [`Response::ExecuteModuleResp`] for the given channel.
    pub fn execute_module(ch_id: ChannelId) -> Self {
        Self::ExecuteModuleResp {
            ch_id: ch_id.to_string(),
        }
    }

    /// Builds a [`Response::ErrorResp`] carrying the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::ErrorResp {
            error: message.into(),
        }
    }

    /// Returns `true` if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ErrorResp { .. })
    }
}
