//! In-process host channel.
//!
//! [`host_channel`] creates the two ends of the event channel: a
//! [`HostClient`] the device-management host drives, and an
//! [`EngineEndpoint`] the dispatcher consumes. Requests are correlated to
//! responses by message id through a shared completion map; completing a
//! request consumes its slot, which is what enforces the at-most-one
//! response per message id guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use mapbridge_core::{
    ChannelError, ChannelResult, EventChannel, InboundEvent, MsgId, Response,
};

/// Default time a host request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<MsgId, oneshot::Sender<Response>>>>;

/// Creates a connected host/engine channel pair.
///
/// `capacity` bounds the number of events buffered between the two ends.
/// Dropping the [`HostClient`] closes the channel: the engine drains any
/// buffered events and then observes closure.
pub fn host_channel(capacity: usize) -> (HostClient, EngineEndpoint) {
    let (tx, rx) = mpsc::channel(capacity);
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

    let client = HostClient {
        tx,
        next_id: AtomicU64::new(1),
        pending: Arc::clone(&pending),
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
    };
    let endpoint = EngineEndpoint {
        rx: tokio::sync::Mutex::new(rx),
        pending,
    };

    (client, endpoint)
}

/// The host side of the channel: sends events, awaits correlated responses.
pub struct HostClient {
    tx: mpsc::Sender<(MsgId, InboundEvent)>,
    next_id: AtomicU64,
    pending: PendingMap,
    request_timeout: Duration,
}

impl HostClient {
    /// Overrides the per-request response timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sends an event and waits for its response.
    ///
    /// Allocates the next message id, registers a completion slot, and
    /// suspends until the engine answers or the timeout expires. On timeout
    /// the slot is withdrawn, so a late response fails on the engine side
    /// instead of leaking.
    pub async fn request(&self, event: InboundEvent) -> ChannelResult<Response> {
        let msg_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(msg_id, tx);

        if self.tx.send((msg_id, event)).await.is_err() {
            self.pending.lock().remove(&msg_id);
            return Err(ChannelError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Engine went away without completing the slot.
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.pending.lock().remove(&msg_id);
                Err(ChannelError::Timeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Sends an event without waiting for any response.
    ///
    /// Used for fire-and-forget broadcasts such as device events, which by
    /// protocol never produce a response.
    pub async fn notify(&self, event: InboundEvent) -> ChannelResult<()> {
        let msg_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send((msg_id, event))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

impl std::fmt::Debug for HostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClient")
            .field("pending", &self.pending.lock().len())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// The engine side of the channel, consumed by the dispatcher.
pub struct EngineEndpoint {
    rx: tokio::sync::Mutex<mpsc::Receiver<(MsgId, InboundEvent)>>,
    pending: PendingMap,
}

#[async_trait]
impl EventChannel for EngineEndpoint {
    async fn accept_event(&self) -> Option<(MsgId, InboundEvent)> {
        self.rx.lock().await.recv().await
    }

    async fn send_response(&self, msg_id: MsgId, response: Response) -> ChannelResult<()> {
        let sender = self
            .pending
            .lock()
            .remove(&msg_id)
            .ok_or(ChannelError::UnknownMessage { msg_id })?;

        // The requester stopped waiting; its slot is gone either way.
        sender
            .send(response)
            .map_err(|_| ChannelError::UnknownMessage { msg_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapbridge_core::{ExecuteSideModuleParams, OnDeviceEventParams};
    use serde_json::Value;

    fn execute_event(ch_id: i64) -> InboundEvent {
        InboundEvent::ExecuteSideModule(ExecuteSideModuleParams {
            ch_id,
            url: "builtin://noop".into(),
        })
    }

    #[tokio::test]
    async fn test_request_response_correlation() {
        let (client, endpoint) = host_channel(8);
        let endpoint = Arc::new(endpoint);

        // Echo engine: answers each request with its channel id.
        let engine = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                while let Some((msg_id, event)) = endpoint.accept_event().await {
                    let InboundEvent::ExecuteSideModule(params) = event else {
                        continue;
                    };
                    endpoint
                        .send_response(msg_id, Response::execute_module(params.ch_id))
                        .await
                        .unwrap();
                }
            })
        };

        let resp = client.request(execute_event(3)).await.unwrap();
        assert_eq!(resp, Response::ExecuteModuleResp { ch_id: "3".into() });

        let resp = client.request(execute_event(4)).await.unwrap();
        assert_eq!(resp, Response::ExecuteModuleResp { ch_id: "4".into() });

        drop(client);
        engine.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_response_for_same_message_fails() {
        let (client, endpoint) = host_channel(8);
        let endpoint = Arc::new(endpoint);

        let requester = tokio::spawn(async move { client.request(execute_event(1)).await });

        let (msg_id, _) = endpoint.accept_event().await.unwrap();
        endpoint
            .send_response(msg_id, Response::execute_module(1))
            .await
            .unwrap();

        let err = endpoint
            .send_response(msg_id, Response::execute_module(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownMessage { .. }));

        requester.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_notify_carries_no_completion_slot() {
        let (client, endpoint) = host_channel(8);

        client
            .notify(InboundEvent::OnDeviceEvent(OnDeviceEventParams {
                dev_id: "dev1".into(),
                payload: Value::Null,
            }))
            .await
            .unwrap();

        let (msg_id, _) = endpoint.accept_event().await.unwrap();
        let err = endpoint
            .send_response(msg_id, Response::BindDeviceModuleResp)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownMessage { .. }));
    }

    #[tokio::test]
    async fn test_request_times_out_without_answer() {
        let (client, _endpoint) = host_channel(8);
        let client = client.with_request_timeout(Duration::from_millis(30));

        let err = client.request(execute_event(1)).await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_closure_is_observed_after_drain() {
        let (client, endpoint) = host_channel(8);

        client.notify(execute_event(1)).await.unwrap();
        drop(client);

        // Buffered event is still delivered, then closure.
        assert!(endpoint.accept_event().await.is_some());
        assert!(endpoint.accept_event().await.is_none());
    }
}
