//! Hotswap Routing
//!
//! Maps invocation selectors to deployed modules.
//!
//! ## Core Concepts
//!
//! - **Single-pointer** tables route every selector to one target
//! - **Multi-entry** tables route selectors individually, with an optional
//!   default for unrouted selectors and tombstones for removed ones
//! - **Batches** ([`RouteBatch`]) are validated as a whole and yield a new
//!   table plus the list of [`Rebinding`]s they caused
//!
//! ```
//! use hotswap_module::{ModuleId, Selector};
//! use hotswap_routing::{RouteBatch, RoutingTable};
//!
//! let default = ModuleId::new();
//! let facet = ModuleId::new();
//! let (table, _) = RoutingTable::multi(Some(default))
//!     .apply(&RouteBatch::new().add(4, facet))
//!     .unwrap();
//!
//! assert_eq!(table.resolve(Selector::from_u32(4)), Some(facet));
//! assert_eq!(table.resolve(Selector::from_u32(5)), Some(default));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod batch;
mod table;

pub use batch::{RouteBatch, RouteChange};
pub use table::{Rebinding, RouteSlot, RoutingError, RoutingMode, RoutingTable};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
