//! Module registry and device/channel bindings.
//!
//! Both structures have synchronized interior state so concurrent handlers
//! can share them behind plain `Arc`s.
//!
//! # Single-flight loading
//!
//! [`ModuleRegistry::get_or_load`] guarantees at most one module instance
//! per channel even when load requests race: each channel owns one
//! `OnceCell`, and concurrent loaders coalesce on it. A failed load leaves
//! the cell empty, so a later event can retry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::debug;

use mapbridge_core::{BoxedLoader, BoxedModule, ChannelId, DeviceId, LoadResult};

/// Registry mapping channel ids to their loaded mapping modules.
///
/// Entries are created once per channel and are immutable thereafter; there
/// is no unload or replace operation. The registry lives for the process
/// lifetime of the dispatcher.
pub struct ModuleRegistry {
    /// Constructs modules on first use of a channel.
    loader: BoxedLoader,
    /// One load cell per channel. The outer lock is never held across an
    /// await; loads coalesce on the per-channel cell instead.
    modules: Mutex<HashMap<ChannelId, Arc<OnceCell<BoxedModule>>>>,
}

impl ModuleRegistry {
    /// Creates an empty registry backed by the given loader.
    pub fn new(loader: BoxedLoader) -> Self {
        Self {
            loader,
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the module for `ch_id`, loading it on first use.
    ///
    /// A cached module is returned unconditionally; `url` is ignored on a
    /// cache hit, so the first writer's URL wins even under races. Loads for
    /// the same channel issued concurrently coalesce into a single
    /// underlying load.
    pub async fn get_or_load(&self, ch_id: ChannelId, url: &str) -> LoadResult<BoxedModule> {
        let cell = {
            let mut modules = self.modules.lock();
            Arc::clone(modules.entry(ch_id).or_default())
        };

        let module = cell
            .get_or_try_init(|| async {
                debug!(ch_id, url, "loading mapping module");
                self.loader.load(url).await
            })
            .await?;

        Ok(Arc::clone(module))
    }

    /// Returns the module for `ch_id` if one has been loaded.
    pub fn get(&self, ch_id: ChannelId) -> Option<BoxedModule> {
        self.modules
            .lock()
            .get(&ch_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Returns `true` if `ch_id` has a loaded module.
    pub fn contains(&self, ch_id: ChannelId) -> bool {
        self.get(ch_id).is_some()
    }

    /// Returns the number of channels with a loaded module.
    pub fn len(&self) -> usize {
        self.modules
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Returns `true` if no module has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("loaded", &self.len())
            .finish()
    }
}

/// Ordered device-to-channel bindings for device event fan-out.
///
/// Bindings are appended, never pruned, and deliberately not deduplicated:
/// binding the same `(ch_id, dev_id)` pair twice makes the device's events
/// reach that channel's module twice.
#[derive(Default)]
pub struct DeviceBindings {
    bindings: RwLock<HashMap<DeviceId, Vec<ChannelId>>>,
}

impl DeviceBindings {
    /// Creates an empty binding store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `ch_id` to the device's channel list, creating it if absent.
    pub fn bind(&self, ch_id: ChannelId, dev_id: &str) {
        self.bindings
            .write()
            .entry(dev_id.to_string())
            .or_default()
            .push(ch_id);
    }

    /// Returns the device's bound channels in insertion order.
    ///
    /// Empty if the device has no bindings.
    pub fn channels(&self, dev_id: &str) -> Vec<ChannelId> {
        self.bindings
            .read()
            .get(dev_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of devices with at least one binding.
    pub fn device_count(&self) -> usize {
        self.bindings.read().len()
    }
}

impl std::fmt::Debug for DeviceBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBindings")
            .field("devices", &self.device_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mapbridge_core::{MappingModule, ModuleLoadError, ModuleLoader, ModuleResult};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullModule;

    #[async_trait]
    impl MappingModule for NullModule {
        async fn on_char_read(&self, _service_tag: &str, _char_tag: &str) -> ModuleResult<Value> {
            Ok(Value::Null)
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
    }

    /// Counts load invocations and yields before completing, so racing
    /// loads actually overlap.
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl CountingLoader {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ModuleLoader for CountingLoader {
        async fn load(&self, _url: &str) -> LoadResult<BoxedModule> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Arc::new(NullModule))
        }
    }

    /// Fails the first load for each URL, succeeds afterwards.
    struct FlakyLoader {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ModuleLoader for FlakyLoader {
        async fn load(&self, _url: &str) -> LoadResult<BoxedModule> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ModuleLoadError::Construction("first attempt fails".into()))
            } else {
                Ok(Arc::new(NullModule))
            }
        }
    }

    #[tokio::test]
    async fn test_cache_hit_ignores_url() {
        let loader = CountingLoader::new();
        let registry = ModuleRegistry::new(loader.clone());

        let first = registry.get_or_load(1, "builtin://a").await.unwrap();
        let second = registry.get_or_load(1, "builtin://b").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_channels_load_independently() {
        let loader = CountingLoader::new();
        let registry = ModuleRegistry::new(loader.clone());

        registry.get_or_load(1, "builtin://a").await.unwrap();
        registry.get_or_load(2, "builtin://a").await.unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_single_flight() {
        let loader = CountingLoader::new();
        let registry = Arc::new(ModuleRegistry::new(loader.clone()));

        let a = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_load(1, "builtin://a").await })
        };
        let b = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_load(1, "builtin://b").await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_channel_unregistered() {
        let loader = Arc::new(FlakyLoader {
            attempts: AtomicUsize::new(0),
        });
        let registry = ModuleRegistry::new(loader);

        let err = registry.get_or_load(1, "builtin://a").await.unwrap_err();
        assert!(matches!(err, ModuleLoadError::Construction(_)));
        assert!(!registry.contains(1));

        // Retry on a later event succeeds.
        registry.get_or_load(1, "builtin://a").await.unwrap();
        assert!(registry.contains(1));
    }

    #[tokio::test]
    async fn test_get_does_not_load() {
        let loader = CountingLoader::new();
        let registry = ModuleRegistry::new(loader.clone());

        assert!(registry.get(1).is_none());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bindings_preserve_duplicates_and_order() {
        let bindings = DeviceBindings::new();
        bindings.bind(1, "dev1");
        bindings.bind(2, "dev1");
        bindings.bind(1, "dev1");

        assert_eq!(bindings.channels("dev1"), vec![1, 2, 1]);
    }

    #[test]
    fn test_unbound_device_has_no_channels() {
        let bindings = DeviceBindings::new();
        assert!(bindings.channels("dev1").is_empty());
        assert_eq!(bindings.device_count(), 0);
    }
}
