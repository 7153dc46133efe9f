//! Module records and the code interface
//!
//! A [`Module`] pairs immutable code with the storage layout it declares.
//! Once built it never changes; upgrades deploy a new module.

use crate::context::{CallContext, UpgradeProposal};
use crate::fault::ModuleFault;
use crate::ids::{ModuleId, Selector};
use hotswap_layout::StorageLayout;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Executable side of a module
///
/// Every entry point receives the forwarded [`CallContext`]; storage it
/// touches belongs to the calling dispatcher, not to the module.
pub trait ModuleCode: Send + Sync + 'static {
    /// Human-readable code name
    fn name(&self) -> &str;

    /// Code revision
    fn version(&self) -> u32 {
        1
    }

    /// Main entry point, keyed by selector
    ///
    /// # Errors
    /// Any [`ModuleFault`]; the dispatcher forwards it to the caller.
    fn call(&self, entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault>;

    /// Initializer run once when a dispatcher is bound to this module
    ///
    /// # Errors
    /// Any [`ModuleFault`]; initialization is then abandoned.
    fn initialize(&self, _cx: &mut CallContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }

    /// Authorization entry point for self-authorizing dispatchers
    ///
    /// # Errors
    /// Returning any error refuses the proposal.
    fn authorize_upgrade(
        &self,
        _cx: &mut CallContext<'_>,
        _proposal: &UpgradeProposal,
    ) -> Result<(), ModuleFault> {
        Err(ModuleFault::Unsupported("authorize_upgrade"))
    }
}

/// Content reference of a module's code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeRef {
    /// Code name
    pub name: String,
    /// Code revision
    pub version: u32,
    /// SHA-256 over name, version and canonical layout
    pub digest: [u8; 32],
}

impl CodeRef {
    fn compute(name: &str, version: u32, layout: &StorageLayout) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(version.to_le_bytes());
        hasher.update(layout.canonical_bytes());
        Self {
            name: name.to_string(),
            version,
            digest: hasher.finalize().into(),
        }
    }

    /// First 8 digest bytes as hex
    #[must_use]
    pub fn short_digest(&self) -> String {
        hex::encode(&self.digest[..8])
    }
}

impl fmt::Display for CodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}#{}", self.name, self.version, self.short_digest())
    }
}

/// Immutable, addressable code unit
#[derive(Clone)]
pub struct Module {
    id: ModuleId,
    code_ref: CodeRef,
    layout: StorageLayout,
    code: Arc<dyn ModuleCode>,
}

impl Module {
    /// Build a module from code and its declared layout
    pub fn new(code: impl ModuleCode, layout: StorageLayout) -> Self {
        Self::from_arc(Arc::new(code), layout)
    }

    /// Build from shared code
    pub fn from_arc(code: Arc<dyn ModuleCode>, layout: StorageLayout) -> Self {
        let code_ref = CodeRef::compute(code.name(), code.version(), &layout);
        Self {
            id: ModuleId::new(),
            code_ref,
            layout,
            code,
        }
    }

    /// Module id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Content reference
    #[inline]
    #[must_use]
    pub fn code_ref(&self) -> &CodeRef {
        &self.code_ref
    }

    /// Declared storage layout
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Executable code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &dyn ModuleCode {
        self.code.as_ref()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("code_ref", &self.code_ref)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
