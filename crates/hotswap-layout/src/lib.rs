//! Hotswap Storage Layouts
//!
//! Declared storage regions of a module and the pure checks that decide
//! whether one module may take over storage written by another.
//!
//! # Core Concepts
//!
//! - [`StorageLayout`]: ordered, non-overlapping list of [`Region`]s
//! - [`LayoutValidator::is_compatible`]: append-only upgrade rule
//! - [`LayoutValidator::no_overlap`]: disjointness of side-by-side modules
//!
//! # Example
//!
//! ```rust
//! use hotswap_layout::{LayoutValidator, StorageLayout};
//!
//! let v1 = StorageLayout::builder().field("x", 1).build().unwrap();
//! let v2 = StorageLayout::builder().field("x", 1).field("y", 1).build().unwrap();
//!
//! assert!(LayoutValidator::is_compatible(&v1, &v2));
//! assert!(!LayoutValidator::is_compatible(&v2, &v1));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod region;
mod validator;

pub use region::{LayoutBuilder, Region, SlotTag, StorageLayout};
pub use validator::{Incompatibility, LayoutError, LayoutValidator};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
