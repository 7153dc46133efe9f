//! Module registry
//!
//! Append-only: modules are deployed once and never removed, so a module
//! can never disappear while a dispatcher still routes to it.

use crate::ids::ModuleId;
use crate::module::Module;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared store of deployed modules
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<ModuleId, Arc<Module>>>,
}

impl ModuleRegistry {
    /// Create new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy a module, returning its id
    pub fn deploy(&self, module: Module) -> ModuleId {
        let id = module.id();
        tracing::debug!(module = %id, code = %module.code_ref(), "module deployed");
        self.modules.write().entry(id).or_insert_with(|| Arc::new(module));
        id
    }

    /// Look up a module
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.modules.read().get(&id).cloned()
    }

    /// Check if a module is deployed
    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.modules.read().contains_key(&id)
    }

    /// Number of deployed modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    /// Check if nothing is deployed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// All deployed ids
    #[must_use]
    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.read().keys().copied().collect()
    }
}
