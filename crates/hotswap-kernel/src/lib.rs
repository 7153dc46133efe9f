//! Hotswap Kernel
//!
//! Runtime for upgradeable dispatchers: a stable front end that owns
//! storage and forwards every invocation to replaceable module code.
//!
//! # Core Concepts
//!
//! - **Dispatcher**: owns storage and routing; modules run against the
//!   dispatcher's storage with the original caller's identity
//! - **Trust models**: external admin, self-authorizing module, or a
//!   shared [`Beacon`]
//! - **Upgrades**: authorized, layout-checked, committed with one pointer
//!   swap and recorded in a hash-chained [`UpgradeLog`]
//! - **Clones**: immutable instances from a [`CloneFactory`]
//! - **Budgets**: every top-level call runs under a budget; exhaustion or
//!   any other failure rolls the whole call back
//!
//! # Quick Start
//!
//! ```rust
//! use hotswap_kernel::prelude::*;
//! use std::sync::Arc;
//!
//! struct Counter;
//!
//! impl ModuleCode for Counter {
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     fn call(&self, _entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
//!         let next = cx.field_u64("x")? + 1;
//!         cx.set_field_u64("x", next)?;
//!         Ok(next.to_be_bytes().to_vec())
//!     }
//! }
//!
//! let registry = Arc::new(ModuleRegistry::new());
//! let layout = StorageLayout::builder().field("x", 1).build().unwrap();
//! let v1 = registry.deploy(Module::new(Counter, layout));
//!
//! let dispatcher = Dispatcher::new(Arc::clone(&registry), TrustModel::ExternalAdmin);
//! let admin = Identity::new();
//! dispatcher.initialize(v1, admin, &[]).unwrap();
//!
//! let user = Identity::new();
//! dispatcher.invoke(Selector::from_u32(1), &[], user).unwrap();
//! assert_eq!(dispatcher.load(0).as_u64(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod admin;
mod audit;
mod beacon;
mod budget;
mod clone;
mod config;
mod dispatcher;
mod error;
mod frame;
mod instance;
mod lifecycle;
mod storage;

pub mod test_harness;

pub use admin::AdminCall;
pub use audit::{UpgradeLog, UpgradeRecord};
pub use beacon::{Beacon, BeaconId, BeaconView};
pub use clone::CloneFactory;
pub use config::{BudgetConfig, RuntimeConfig};
pub use dispatcher::Dispatcher;
pub use error::{AuditError, ConfigError, DispatchError, Outcome};
pub use instance::TrustModel;
pub use lifecycle::Lifecycle;

/// Everything needed to deploy modules and drive dispatchers
pub mod prelude {
    pub use crate::{
        AdminCall, Beacon, CloneFactory, DispatchError, Dispatcher, Lifecycle, Outcome,
        RuntimeConfig, TrustModel, UpgradeLog,
    };
    pub use hotswap_layout::{LayoutValidator, StorageLayout};
    pub use hotswap_module::{
        CallContext, DispatcherAddress, Identity, Module, ModuleCode, ModuleFault, ModuleId,
        ModuleRegistry, ProposedAction, Selector, UpgradeProposal, Word,
    };
    pub use hotswap_routing::{RouteBatch, RoutingMode, RoutingTable};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
