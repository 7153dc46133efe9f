//! Clone factory
//!
//! Produces cheap dispatcher instances permanently bound to one module.
//! Clones have their own storage but no routing table and no controller:
//! every governance attempt fails with [`DispatchError::ImmutableRoute`].

use crate::config::RuntimeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::lifecycle::Lifecycle;
use hotswap_module::{DispatcherAddress, Identity, ModuleId, ModuleRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Factory and directory of immutable clone instances
#[derive(Debug)]
pub struct CloneFactory {
    registry: Arc<ModuleRegistry>,
    config: RuntimeConfig,
    clones: RwLock<HashMap<DispatcherAddress, Arc<Dispatcher>>>,
}

impl CloneFactory {
    /// Create a factory with default configuration
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    /// Create a factory whose clones use `config`
    #[must_use]
    pub fn with_config(registry: Arc<ModuleRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            clones: RwLock::new(HashMap::new()),
        }
    }

    /// Create an active clone bound to `module`, without running an initializer
    ///
    /// # Errors
    /// [`DispatchError::UnknownModule`] if the module is not deployed.
    pub fn create(&self, module: ModuleId) -> Result<DispatcherAddress, DispatchError> {
        self.ensure_deployed(module)?;
        let clone = Dispatcher::fixed(
            Arc::clone(&self.registry),
            module,
            self.config.clone(),
            Lifecycle::Active,
        );
        Ok(self.register(clone, module))
    }

    /// Create a clone and run the module's initializer in the same step
    ///
    /// Nothing is registered if the initializer fails.
    ///
    /// # Errors
    /// [`DispatchError::UnknownModule`] or the initializer's failure.
    pub fn create_initialized(
        &self,
        module: ModuleId,
        caller: Identity,
        payload: &[u8],
    ) -> Result<DispatcherAddress, DispatchError> {
        self.ensure_deployed(module)?;
        let clone = Dispatcher::fixed(
            Arc::clone(&self.registry),
            module,
            self.config.clone(),
            Lifecycle::Uninitialized,
        );
        clone.initialize(module, caller, payload)?;
        Ok(self.register(clone, module))
    }

    /// Look up a clone
    #[must_use]
    pub fn get(&self, address: DispatcherAddress) -> Option<Arc<Dispatcher>> {
        self.clones.read().get(&address).cloned()
    }

    /// Number of clones created
    #[must_use]
    pub fn len(&self) -> usize {
        self.clones.read().len()
    }

    /// Check if no clone exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clones.read().is_empty()
    }

    fn ensure_deployed(&self, module: ModuleId) -> Result<(), DispatchError> {
        if self.registry.contains(module) {
            Ok(())
        } else {
            Err(DispatchError::UnknownModule { module })
        }
    }

    fn register(&self, clone: Dispatcher, module: ModuleId) -> DispatcherAddress {
        let address = clone.address();
        self.clones.write().insert(address, Arc::new(clone));
        info!(clone = %address, %module, "clone created");
        address
    }
}
