//! Hotswap Modules
//!
//! Immutable code units and everything a module needs to run under a
//! dispatcher:
//!
//! - [`Module`] / [`ModuleCode`]: code plus declared [`StorageLayout`]
//! - [`CallContext`] / [`Host`]: forwarded execution against the
//!   dispatcher's storage with the original caller's identity
//! - [`Selector`], [`Identity`], [`ModuleId`], [`DispatcherAddress`], [`Word`]
//! - [`ModuleRegistry`]: append-only deployment store
//!
//! [`StorageLayout`]: hotswap_layout::StorageLayout

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod context;
mod fault;
mod ids;
mod module;
mod registry;

pub use context::{CallContext, Host, ProposedAction, UpgradeProposal};
pub use fault::ModuleFault;
pub use ids::{DispatcherAddress, Identity, ModuleId, Selector, Word};
pub use module::{CodeRef, Module, ModuleCode};
pub use registry::ModuleRegistry;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
