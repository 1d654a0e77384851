//! The event dispatch loop.
//!
//! The dispatcher pulls `(MsgId, InboundEvent)` pairs from the host channel,
//! resolves a handler by the event's dispatch key, and launches the handler
//! as a tracked task so the loop immediately resumes accepting further
//! events. Request handling is therefore logically concurrent and response
//! order is not FIFO.
//!
//! # Failure conversion
//!
//! A handler failure (error return or timeout) is converted into an
//! `ErrorResp` addressed to the originating message id. If sending that
//! response itself fails, the failure is logged and swallowed; nothing a
//! single request does can stall the loop.
//!
//! Events whose dispatch key has no registered handler are logged and
//! dropped without a response. This mirrors the host protocol as deployed;
//! see DESIGN.md for why the gap is preserved.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{Level, debug, error, info, span, warn};

use mapbridge_core::{BoxedChannel, Response};

use crate::error::DispatchError;
use crate::handlers::{HandlerContext, HandlerSet};

/// Drives the event loop between the host channel and the handler set.
pub struct Dispatcher {
    handlers: Arc<HandlerSet>,
    ctx: Arc<HandlerContext>,
    handler_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over the given handler set and shared state.
    pub fn new(
        handlers: Arc<HandlerSet>,
        ctx: Arc<HandlerContext>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            handlers,
            ctx,
            handler_timeout,
        }
    }

    /// Runs the dispatch loop until the channel reports closure.
    ///
    /// Closure is terminal; before returning, the loop drains all in-flight
    /// handler tasks so no work is leaked.
    pub async fn run(&self, channel: BoxedChannel) {
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            // Reap finished handlers without blocking the accept loop.
            while tasks.try_join_next().is_some() {}

            let Some((msg_id, event)) = channel.accept_event().await else {
                break;
            };

            let key = event.handler_key();
            {
                let span = span!(Level::DEBUG, "dispatch", msg_id, event = %key);
                let _enter = span.enter();
                debug!("accepted event");
            }

            let handler = match self.handlers.resolve(&key) {
                Ok(handler) => handler,
                Err(e) => {
                    // Protocol gap kept from the deployed host: no response
                    // is sent for an unhandled event type.
                    warn!(msg_id, error = %e, "dropping event without response");
                    continue;
                }
            };

            let ctx = Arc::clone(&self.ctx);
            let channel = Arc::clone(&channel);
            let timeout = self.handler_timeout;

            tasks.spawn(async move {
                let result = match tokio::time::timeout(
                    timeout,
                    handler.handle(&ctx, channel.as_ref(), msg_id, event),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };

                if let Err(e) = result {
                    error!(msg_id, error = %e, "handler failed");
                    if let Err(send_err) = channel
                        .send_response(msg_id, Response::error(e.to_string()))
                        .await
                    {
                        error!(msg_id, error = %send_err, "failed to deliver error response");
                    }
                }
            });
        }

        debug!(in_flight = tasks.len(), "event channel closed, draining handlers");
        while tasks.join_next().await.is_some() {}
        info!("dispatcher stopped");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mapbridge_core::{
        BindDeviceModuleParams, BoxedModule, ChannelResult, EventChannel,
        ExecuteSideModuleParams, InboundEvent, LoadResult, MappingModule, ModuleError,
        ModuleLoadError, ModuleLoader, ModuleResult, MsgId, OnCharReadParams, OnCharUpdateParams,
        OnDeviceEventParams,
    };
    use parking_lot::Mutex as SyncMutex;
    use serde_json::{Value, json};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;
    use tokio::task::JoinHandle;

    use crate::channel::{HostClient, host_channel};
    use crate::registry::{DeviceBindings, ModuleRegistry};

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    /// A module whose reads return a fixed value (optionally after a delay)
    /// and whose device-event handler counts invocations.
    struct RecordingModule {
        value: Value,
        read_delay: Duration,
        device_events: AtomicUsize,
        fail_char_read: bool,
        fail_device_event: bool,
    }

    impl RecordingModule {
        fn ok(value: Value) -> Self {
            Self {
                value,
                read_delay: Duration::ZERO,
                device_events: AtomicUsize::new(0),
                fail_char_read: false,
                fail_device_event: false,
            }
        }

        fn slow(value: Value, read_delay: Duration) -> Self {
            Self {
                read_delay,
                ..Self::ok(value)
            }
        }

        fn failing() -> Self {
            Self {
                fail_char_read: true,
                fail_device_event: true,
                ..Self::ok(Value::Null)
            }
        }
    }

    #[async_trait]
    impl MappingModule for RecordingModule {
        async fn on_char_read(&self, _service_tag: &str, _char_tag: &str) -> ModuleResult<Value> {
            if !self.read_delay.is_zero() {
                tokio::time::sleep(self.read_delay).await;
            }
            if self.fail_char_read {
                Err(ModuleError::execution("read exploded"))
            } else {
                Ok(self.value.clone())
            }
        }

        async fn on_char_update(
            &self,
            _service_tag: &str,
            _char_tag: &str,
            _old_value: Value,
            _new_value: Value,
        ) -> ModuleResult<()> {
            Ok(())
        }

        fn handles_device_events(&self) -> bool {
            true
        }

        async fn on_device_event(&self, _event: OnDeviceEventParams) -> ModuleResult<()> {
            if self.fail_device_event {
                Err(ModuleError::execution("device event exploded"))
            } else {
                self.device_events.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Serves pre-built modules keyed by URL.
    struct FixtureLoader {
        modules: SyncMutex<HashMap<String, BoxedModule>>,
    }

    impl FixtureLoader {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                modules: SyncMutex::new(HashMap::new()),
            })
        }

        fn insert(&self, url: &str, module: BoxedModule) {
            self.modules.lock().insert(url.to_string(), module);
        }
    }

    #[async_trait]
    impl ModuleLoader for FixtureLoader {
        async fn load(&self, url: &str) -> LoadResult<BoxedModule> {
            self.modules
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| ModuleLoadError::FactoryNotFound {
                    name: url.to_string(),
                })
        }
    }

    /// Replays a fixed event script and records every response sent; used
    /// where the test must observe that *no* response was produced.
    struct ScriptedChannel {
        events: AsyncMutex<VecDeque<(MsgId, InboundEvent)>>,
        sent: SyncMutex<Vec<(MsgId, Response)>>,
    }

    impl ScriptedChannel {
        fn new(events: Vec<(MsgId, InboundEvent)>) -> Arc<Self> {
            Arc::new(Self {
                events: AsyncMutex::new(events.into()),
                sent: SyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EventChannel for ScriptedChannel {
        async fn accept_event(&self) -> Option<(MsgId, InboundEvent)> {
            self.events.lock().await.pop_front()
        }

        async fn send_response(&self, msg_id: MsgId, response: Response) -> ChannelResult<()> {
            self.sent.lock().push((msg_id, response));
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn spawn_dispatcher(
        loader: Arc<FixtureLoader>,
        handlers: HandlerSet,
        handler_timeout: Duration,
    ) -> (HostClient, JoinHandle<()>) {
        let ctx = Arc::new(HandlerContext {
            registry: Arc::new(ModuleRegistry::new(loader)),
            bindings: Arc::new(DeviceBindings::new()),
        });
        let dispatcher = Dispatcher::new(Arc::new(handlers), ctx, handler_timeout);

        let (client, endpoint) = host_channel(16);
        let handle = tokio::spawn(async move {
            dispatcher.run(Arc::new(endpoint)).await;
        });
        (client, handle)
    }

    fn execute(ch_id: i64, url: &str) -> InboundEvent {
        InboundEvent::ExecuteSideModule(ExecuteSideModuleParams {
            ch_id,
            url: url.to_string(),
        })
    }

    fn bind(ch_id: i64, dev_id: &str) -> InboundEvent {
        InboundEvent::BindDeviceModule(BindDeviceModuleParams {
            ch_id,
            dev_id: dev_id.to_string(),
        })
    }

    fn char_read(ch_id: i64) -> InboundEvent {
        InboundEvent::OnCharRead(OnCharReadParams {
            ch_id,
            service_tag: "s".into(),
            char_tag: "c".into(),
        })
    }

    fn char_update(ch_id: i64) -> InboundEvent {
        InboundEvent::OnCharUpdate(OnCharUpdateParams {
            ch_id,
            service_tag: "s".into(),
            char_tag: "c".into(),
            old_value: json!(20),
            new_value: json!(80),
        })
    }

    fn device_event(dev_id: &str) -> InboundEvent {
        InboundEvent::OnDeviceEvent(OnDeviceEventParams {
            dev_id: dev_id.to_string(),
            payload: json!({ "siid": 2, "piid": 1 }),
        })
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_execute_bind_read_scenario() {
        let loader = FixtureLoader::new();
        loader.insert("builtin://a", Arc::new(RecordingModule::ok(json!(21))));

        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        let resp = client.request(execute(1, "builtin://a")).await.unwrap();
        assert_eq!(resp, Response::ExecuteModuleResp { ch_id: "1".into() });

        let resp = client.request(bind(1, "dev1")).await.unwrap();
        assert_eq!(resp, Response::BindDeviceModuleResp);

        let resp = client.request(char_read(1)).await.unwrap();
        assert_eq!(resp, Response::CharReadResp { value: json!(21) });

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_char_update_yields_unit_response() {
        let loader = FixtureLoader::new();
        loader.insert("builtin://a", Arc::new(RecordingModule::ok(Value::Null)));

        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        client.request(execute(1, "builtin://a")).await.unwrap();
        let resp = client.request(char_update(1)).await.unwrap();
        assert_eq!(resp, Response::CharUpdateResp);

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_on_unregistered_channel_yields_error_resp() {
        let loader = FixtureLoader::new();
        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        let resp = client.request(char_update(99)).await.unwrap();
        let Response::ErrorResp { error } = resp else {
            panic!("expected ErrorResp, got {resp:?}");
        };
        assert!(error.contains("no module registered"));

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_module_yields_error_resp() {
        let loader = FixtureLoader::new();
        loader.insert("builtin://bad", Arc::new(RecordingModule::failing()));

        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        client.request(execute(1, "builtin://bad")).await.unwrap();
        let resp = client.request(char_read(1)).await.unwrap();

        let Response::ErrorResp { error } = resp else {
            panic!("expected ErrorResp, got {resp:?}");
        };
        assert!(error.contains("read exploded"));

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_load_failure_leaves_channel_retryable() {
        let loader = FixtureLoader::new();

        let (client, handle) =
            spawn_dispatcher(loader.clone(), HandlerSet::with_defaults(), Duration::from_secs(5));

        let resp = client.request(execute(1, "builtin://missing")).await.unwrap();
        assert!(resp.is_error());

        // Registering the module afterwards lets the next event succeed.
        loader.insert("builtin://missing", Arc::new(RecordingModule::ok(json!(1))));
        let resp = client.request(execute(1, "builtin://missing")).await.unwrap();
        assert_eq!(resp, Response::ExecuteModuleResp { ch_id: "1".into() });

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_on_unregistered_channel_yields_error_resp() {
        let loader = FixtureLoader::new();
        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        let resp = client.request(char_read(99)).await.unwrap();
        let Response::ErrorResp { error } = resp else {
            panic!("expected ErrorResp, got {resp:?}");
        };
        assert!(error.contains("no module registered"));

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unhandled_event_gets_no_response() {
        let loader = FixtureLoader::new();
        let channel = ScriptedChannel::new(vec![(7, char_read(1))]);

        // Handler set without onCharRead.
        let mut handlers = HandlerSet::new();
        handlers.register(Arc::new(crate::handlers::ExecuteSideModule));

        let ctx = Arc::new(HandlerContext {
            registry: Arc::new(ModuleRegistry::new(loader)),
            bindings: Arc::new(DeviceBindings::new()),
        });
        let dispatcher = Dispatcher::new(Arc::new(handlers), ctx, Duration::from_secs(5));
        dispatcher.run(channel.clone()).await;

        assert!(channel.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_device_event_fan_out_is_isolated() {
        let loader = FixtureLoader::new();
        let failing = Arc::new(RecordingModule::failing());
        let healthy = Arc::new(RecordingModule::ok(Value::Null));
        loader.insert("builtin://failing", failing.clone());
        loader.insert("builtin://healthy", healthy.clone());

        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        client.request(execute(1, "builtin://failing")).await.unwrap();
        client.request(execute(2, "builtin://healthy")).await.unwrap();
        client.request(bind(1, "dev1")).await.unwrap();
        client.request(bind(2, "dev1")).await.unwrap();

        client.notify(device_event("dev1")).await.unwrap();
        drop(client);
        handle.await.unwrap();

        // The failing module did not stop fan-out to the healthy one.
        assert_eq!(healthy.device_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_binding_fans_out_twice() {
        let loader = FixtureLoader::new();
        let module = Arc::new(RecordingModule::ok(Value::Null));
        loader.insert("builtin://a", module.clone());

        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));

        client.request(execute(1, "builtin://a")).await.unwrap();
        client.request(bind(1, "dev1")).await.unwrap();
        client.request(bind(1, "dev1")).await.unwrap();

        client.notify(device_event("dev1")).await.unwrap();
        drop(client);
        handle.await.unwrap();

        assert_eq!(module.device_events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_timeout_yields_error_resp() {
        let loader = FixtureLoader::new();
        loader.insert(
            "builtin://stalled",
            Arc::new(RecordingModule::slow(Value::Null, Duration::from_secs(60))),
        );

        let (client, handle) = spawn_dispatcher(
            loader,
            HandlerSet::with_defaults(),
            Duration::from_millis(50),
        );

        client.request(execute(1, "builtin://stalled")).await.unwrap();
        let resp = client.request(char_read(1)).await.unwrap();

        let Response::ErrorResp { error } = resp else {
            panic!("expected ErrorResp, got {resp:?}");
        };
        assert!(error.contains("timed out"));

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_block_the_loop() {
        let loader = FixtureLoader::new();
        loader.insert(
            "builtin://slow",
            Arc::new(RecordingModule::slow(json!(1), Duration::from_millis(500))),
        );
        loader.insert("builtin://fast", Arc::new(RecordingModule::ok(json!(2))));

        let (client, handle) =
            spawn_dispatcher(loader, HandlerSet::with_defaults(), Duration::from_secs(5));
        let client = Arc::new(client);

        client.request(execute(1, "builtin://slow")).await.unwrap();
        client.request(execute(2, "builtin://fast")).await.unwrap();

        let slow = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request(char_read(1)).await })
        };

        // The fast request completes while the slow one is still running.
        let resp = client.request(char_read(2)).await.unwrap();
        assert_eq!(resp, Response::CharReadResp { value: json!(2) });
        assert!(!slow.is_finished());

        let resp = slow.await.unwrap().unwrap();
        assert_eq!(resp, Response::CharReadResp { value: json!(1) });

        drop(client);
        handle.await.unwrap();
    }
}
