//! Contract with the host runtime's event channel.
//!
//! The host delivers `(MsgId, InboundEvent)` pairs on demand and accepts a
//! response keyed by the message id. The only blocking primitive exposed is
//! "wait for the next event"; sending a response is assumed non-blocking.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChannelResult;
use crate::event::{InboundEvent, MsgId};
use crate::response::Response;

/// The inbound event channel from the device-management host.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Suspends until the next event is available.
    ///
    /// Returns `None` when the channel is closed; closure is terminal.
    async fn accept_event(&self) -> Option<(MsgId, InboundEvent)>;

    /// Delivers exactly one response record for the given message id.
    async fn send_response(&self, msg_id: MsgId, response: Response) -> ChannelResult<()>;
}

/// A shared, type-erased event channel handle.
pub type BoxedChannel = Arc<dyn EventChannel>;
