use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::kernel::constants;
use crate::kernel::context::Kernel;
use crate::kernel::error::Result;
use crate::kernel::lifecycle::LifecycleState;
use crate::registry::{Catalog, DeclarationRegistry};
use crate::state::{ConfigData, StateStore};

/// Builds a root kernel context and seeds its state store.
///
/// Sources are layered in call order; later sources override earlier ones.
///
/// ```ignore
/// let kernel = KernelBuilder::new()
///     .config_file("app.toml")?
///     .process_env(Some("APP_"))
///     .state("port", "8080")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct KernelBuilder {
    id: Option<String>,
    catalog: Option<Arc<Catalog>>,
    config: ConfigData,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context id of the root (defaults to `"kernel"`).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Share a metadata catalog instead of creating a fresh one.
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn config(mut self, config: ConfigData) -> Self {
        self.config.merge(config);
        self
    }

    /// Load a JSON, YAML or TOML file into state.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let loaded = ConfigData::load(path.as_ref())?;
        log::info!(
            "Loaded {} state value(s) from {}",
            loaded.len(),
            path.as_ref().display()
        );
        self.config.merge(loaded);
        Ok(self)
    }

    /// Import process environment variables, optionally filtered by prefix.
    pub fn process_env(mut self, prefix: Option<&str>) -> Self {
        self.config.merge(ConfigData::from_env(prefix));
        self
    }

    pub fn build(self) -> Kernel {
        let id = self.id.unwrap_or_else(|| constants::ROOT_CONTEXT_ID.to_string());
        let catalog = self.catalog.unwrap_or_default();
        let store = StateStore::new();
        store.seed(self.config.into_values());
        log::debug!("Initializing {} v{} context {}", constants::LIB_NAME, constants::LIB_VERSION, id);
        Kernel::from_parts(
            id,
            None,
            catalog,
            DeclarationRegistry::new(),
            Arc::new(store),
            LifecycleState::Stopped,
        )
    }
}

impl Kernel {
    /// A root context with an empty store and its own catalog.
    pub fn new() -> Self {
        KernelBuilder::new().build()
    }

    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
