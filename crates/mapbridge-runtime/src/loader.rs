//! Factory-based module loader.
//!
//! The host addresses modules by URL. Loading is explicit: factories are
//! registered under a name at engine construction time, and
//! `builtin://<name>` URLs resolve against them. Hosts with a dynamic
//! loading substrate of their own can implement [`ModuleLoader`] directly
//! and skip this type entirely.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use mapbridge_core::{BoxedModule, LoadResult, ModuleLoadError, ModuleLoader};

/// URL scheme accepted by [`FactoryModuleLoader`].
pub const BUILTIN_SCHEME: &str = "builtin";

/// Constructs one module instance; receives the full URL so factories can
/// read parameters from it.
pub type ModuleFactory = Arc<dyn Fn(&str) -> LoadResult<BoxedModule> + Send + Sync>;

/// Resolves `builtin://<name>` URLs against registered module factories.
#[derive(Default)]
pub struct FactoryModuleLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl FactoryModuleLoader {
    /// Creates a loader with no registered factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> LoadResult<BoxedModule> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registers a factory (builder pattern).
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> LoadResult<BoxedModule> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Returns the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Extracts the factory name from a `builtin://` URL.
    ///
    /// The name is everything between the scheme and the first `/` or `?`,
    /// so `builtin://switch?siid=2` resolves to `switch`.
    fn factory_name(url: &str) -> LoadResult<&str> {
        let rest = url
            .strip_prefix(BUILTIN_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| ModuleLoadError::InvalidUrl {
                url: url.to_string(),
                reason: format!("expected scheme '{BUILTIN_SCHEME}://'"),
            })?;

        let name = rest
            .split(['/', '?'])
            .next()
            .unwrap_or_default();
        if name.is_empty() {
            return Err(ModuleLoadError::InvalidUrl {
                url: url.to_string(),
                reason: "missing factory name".to_string(),
            });
        }
        Ok(name)
    }
}

#[async_trait]
impl ModuleLoader for FactoryModuleLoader {
    async fn load(&self, url: &str) -> LoadResult<BoxedModule> {
        let name = Self::factory_name(url)?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ModuleLoadError::FactoryNotFound {
                name: name.to_string(),
            })?;

        debug!(name, url, "constructing module from factory");
        factory(url)
    }
}

impl std::fmt::Debug for FactoryModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryModuleLoader")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
