//! Routing change batches
//!
//! A batch is the unit of routing mutation in multi-entry mode: it is
//! validated as a whole and either applied completely or not at all.

use hotswap_module::{ModuleId, Selector};
use serde::{Deserialize, Serialize};

/// One requested change to a selector route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RouteChange {
    /// Route a currently unrouted selector
    Add {
        /// Selector to claim
        selector: Selector,
        /// Target module
        module: ModuleId,
    },
    /// Point a routed selector at another module
    Replace {
        /// Selector to re-point
        selector: Selector,
        /// New target module
        module: ModuleId,
    },
    /// Tombstone a routed selector
    Remove {
        /// Selector to tombstone
        selector: Selector,
    },
}

impl RouteChange {
    /// Selector this change touches
    #[inline]
    #[must_use]
    pub fn selector(&self) -> Selector {
        match *self {
            Self::Add { selector, .. } | Self::Replace { selector, .. } | Self::Remove { selector } => {
                selector
            }
        }
    }

    /// Module claimed by this change; `None` for removals
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<ModuleId> {
        match *self {
            Self::Add { module, .. } | Self::Replace { module, .. } => Some(module),
            Self::Remove { .. } => None,
        }
    }
}

/// Ordered set of route changes applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteBatch {
    changes: Vec<RouteChange>,
}

impl RouteBatch {
    /// Create new empty batch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `Add`
    #[must_use]
    pub fn add(mut self, selector: impl Into<Selector>, module: ModuleId) -> Self {
        self.changes.push(RouteChange::Add {
            selector: selector.into(),
            module,
        });
        self
    }

    /// Append a `Replace`
    #[must_use]
    pub fn replace(mut self, selector: impl Into<Selector>, module: ModuleId) -> Self {
        self.changes.push(RouteChange::Replace {
            selector: selector.into(),
            module,
        });
        self
    }

    /// Append a `Remove`
    #[must_use]
    pub fn remove(mut self, selector: impl Into<Selector>) -> Self {
        self.changes.push(RouteChange::Remove {
            selector: selector.into(),
        });
        self
    }

    /// Append any change
    pub fn push(&mut self, change: RouteChange) {
        self.changes.push(change);
    }

    /// Changes in batch order
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &[RouteChange] {
        &self.changes
    }

    /// Number of changes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if the batch is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Selector claims in batch order (`None` = removal)
    #[must_use]
    pub fn claims(&self) -> Vec<(Selector, Option<ModuleId>)> {
        self.changes.iter().map(|c| (c.selector(), c.target())).collect()
    }
}

impl From<RouteChange> for RouteBatch {
    fn from(change: RouteChange) -> Self {
        Self {
            changes: vec![change],
        }
    }
}
