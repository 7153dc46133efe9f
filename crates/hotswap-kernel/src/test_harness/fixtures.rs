//! Modules the simulator deploys

use hotswap_layout::{LayoutError, StorageLayout};
use hotswap_module::{
    CallContext, Module, ModuleCode, ModuleFault, ModuleId, ModuleRegistry, Selector,
};

pub(crate) const INCREMENT: u32 = 1;
pub(crate) const READ: u32 = 2;
pub(crate) const BURN: u32 = 3;

/// Counter over field `x`; later versions append fields
pub(crate) struct SimCounter {
    pub(crate) version: u32,
}

impl ModuleCode for SimCounter {
    fn name(&self) -> &str {
        "sim-counter"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn call(&self, entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        match entry.as_u32() {
            INCREMENT => {
                let next = cx.field_u64("x")? + 1;
                cx.set_field_u64("x", next)?;
                Ok(next.to_be_bytes().to_vec())
            }
            READ => Ok(cx.field_u64("x")?.to_be_bytes().to_vec()),
            BURN => {
                // Write first so there is something to roll back
                cx.set_field_u64("x", u64::MAX)?;
                loop {
                    cx.charge(1_000)?;
                }
            }
            _ => Err(ModuleFault::UnknownEntry(entry)),
        }
    }
}

/// Facet owning a single field
pub(crate) struct SimFacet {
    pub(crate) field: &'static str,
}

impl ModuleCode for SimFacet {
    fn name(&self) -> &str {
        self.field
    }

    fn call(&self, _entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        let next = cx.field_u64(self.field)? + 1;
        cx.set_field_u64(self.field, next)?;
        Ok(next.to_be_bytes().to_vec())
    }
}

/// Deploy every simulator module; ids come back in [`Deployed`] order
pub(crate) fn deploy_all(registry: &ModuleRegistry) -> Result<Deployed, LayoutError> {
    let v1 = StorageLayout::builder().field("x", 1).build()?;
    let v2 = StorageLayout::builder().field("x", 1).field("y", 1).build()?;
    let v3 = StorageLayout::builder().field("y", 1).field("x", 1).build()?;

    Ok(Deployed {
        counters: [
            registry.deploy(Module::new(SimCounter { version: 1 }, v1)),
            registry.deploy(Module::new(SimCounter { version: 2 }, v2)),
            registry.deploy(Module::new(SimCounter { version: 3 }, v3)),
        ],
        facets: [
            registry.deploy(Module::new(
                SimFacet { field: "a" },
                StorageLayout::builder().at(10).field("a", 2).build()?,
            )),
            // Overlaps facet a at slot 11
            registry.deploy(Module::new(
                SimFacet { field: "b" },
                StorageLayout::builder().at(11).field("b", 1).build()?,
            )),
            registry.deploy(Module::new(
                SimFacet { field: "c" },
                StorageLayout::builder().at(20).field("c", 1).build()?,
            )),
        ],
    })
}

/// Ids of the deployed simulator modules
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deployed {
    /// Counter v1 (`x`), v2 (`x`, `y`), v3 (`y`, `x`: reordered)
    pub(crate) counters: [ModuleId; 3],
    /// Facets a, b (overlaps a) and c
    pub(crate) facets: [ModuleId; 3],
}
