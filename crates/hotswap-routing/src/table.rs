//! Routing tables
//!
//! Tables are immutable values: every mutation produces a new table, which
//! the dispatcher publishes with a single pointer swap.

use crate::batch::RouteBatch;
use hotswap_module::{ModuleId, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Routing mode, fixed at dispatcher construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// One default target for every selector
    #[default]
    SinglePointer,
    /// Explicit selector map plus optional default
    MultiEntry,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePointer => f.write_str("single-pointer"),
            Self::MultiEntry => f.write_str("multi-entry"),
        }
    }
}

/// State of an explicit selector entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSlot {
    /// Routed to a module
    Bound(ModuleId),
    /// Explicitly removed; never falls through to the default
    Tombstone,
}

/// One committed change of a route target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebinding {
    /// Selector changed; `None` for the default entry
    pub selector: Option<Selector>,
    /// Previous target
    pub old: Option<ModuleId>,
    /// New target; `None` for a tombstone
    pub new: Option<ModuleId>,
}

/// Routing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Two claims on one selector disagree; `None` claims the tombstone
    #[error("selector {selector} claimed by both {first:?} and {second:?}")]
    DuplicateRouteClaim {
        /// Contested selector
        selector: Selector,
        /// Earlier claim (batch or live table)
        first: Option<ModuleId>,
        /// Conflicting claim
        second: Option<ModuleId>,
    },

    /// Selector has no live route
    #[error("no route for selector {selector}")]
    RouteNotFound {
        /// Selector looked up
        selector: Selector,
    },

    /// Batch issued against a single-pointer table
    #[error("operation requires multi-entry mode, table is {mode}")]
    ModeMismatch {
        /// Actual table mode
        mode: RoutingMode,
    },

    /// Selector is reserved and cannot be routed
    #[error("selector {selector} is reserved")]
    ReservedSelector {
        /// Offending selector
        selector: Selector,
    },
}

/// Selector → module routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    mode: RoutingMode,
    default: Option<ModuleId>,
    entries: BTreeMap<Selector, RouteSlot>,
}

impl RoutingTable {
    /// Create an empty table
    #[must_use]
    pub fn new(mode: RoutingMode, default: Option<ModuleId>) -> Self {
        Self {
            mode,
            default,
            entries: BTreeMap::new(),
        }
    }

    /// Single-pointer table
    #[must_use]
    pub fn single(target: ModuleId) -> Self {
        Self::new(RoutingMode::SinglePointer, Some(target))
    }

    /// Multi-entry table
    #[must_use]
    pub fn multi(default: Option<ModuleId>) -> Self {
        Self::new(RoutingMode::MultiEntry, default)
    }

    /// Table mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Default target
    #[inline]
    #[must_use]
    pub fn default_target(&self) -> Option<ModuleId> {
        self.default
    }

    /// Resolve a selector; pure and side-effect free
    ///
    /// Reserved selectors never resolve. Tombstoned selectors resolve to
    /// `None` even when a default exists.
    #[must_use]
    pub fn resolve(&self, selector: Selector) -> Option<ModuleId> {
        if selector.is_reserved() {
            return None;
        }
        if self.mode == RoutingMode::SinglePointer || selector.is_none() {
            return self.default;
        }
        match self.entries.get(&selector) {
            Some(RouteSlot::Bound(id)) => Some(*id),
            Some(RouteSlot::Tombstone) => None,
            None => self.default,
        }
    }

    /// Explicit entry for a selector, if any
    #[must_use]
    pub fn slot(&self, selector: Selector) -> Option<RouteSlot> {
        self.entries.get(&selector).copied()
    }

    /// Explicit entries, ordered by selector
    pub fn entries(&self) -> impl Iterator<Item = (Selector, RouteSlot)> + '_ {
        self.entries.iter().map(|(s, slot)| (*s, *slot))
    }

    /// Distinct modules reachable through this table
    #[must_use]
    pub fn routed_modules(&self) -> BTreeSet<ModuleId> {
        self.entries
            .values()
            .filter_map(|slot| match slot {
                RouteSlot::Bound(id) => Some(*id),
                RouteSlot::Tombstone => None,
            })
            .chain(self.default)
            .collect()
    }

    fn bound(&self, selector: Selector) -> Option<ModuleId> {
        match self.entries.get(&selector) {
            Some(RouteSlot::Bound(id)) => Some(*id),
            _ => None,
        }
    }

    /// Table with the default entry re-pointed
    ///
    /// Returns `None` for the rebinding when the target is unchanged.
    #[must_use]
    pub fn with_default(&self, target: ModuleId) -> (Self, Option<Rebinding>) {
        let mut next = self.clone();
        next.default = Some(target);
        let rebinding = (self.default != Some(target)).then_some(Rebinding {
            selector: None,
            old: self.default,
            new: Some(target),
        });
        (next, rebinding)
    }

    /// Validate and apply a batch, producing a new table
    ///
    /// The receiver is never modified. Rebindings are reported in batch
    /// order, with no-op changes omitted.
    ///
    /// # Errors
    /// - [`RoutingError::ModeMismatch`] on a single-pointer table
    /// - [`RoutingError::ReservedSelector`] for reserved or empty selectors
    /// - [`RoutingError::DuplicateRouteClaim`] when two changes in the batch
    ///   disagree on a selector, or an `Add` targets a selector bound to a
    ///   different module. A removal counts as a claim on the tombstone, so
    ///   `remove(s)` followed by `add(s, m)` in one batch reports
    ///   `first: None`; rebinding a live selector takes a `Replace`.
    /// - [`RoutingError::RouteNotFound`] when replacing or removing an
    ///   unbound selector
    pub fn apply(&self, batch: &RouteBatch) -> Result<(Self, Vec<Rebinding>), RoutingError> {
        if self.mode != RoutingMode::MultiEntry {
            return Err(RoutingError::ModeMismatch { mode: self.mode });
        }

        let mut claims: BTreeMap<Selector, Option<ModuleId>> = BTreeMap::new();
        let mut order: Vec<Selector> = Vec::with_capacity(batch.len());

        for change in batch.changes() {
            let selector = change.selector();
            if selector.is_reserved() || selector.is_none() {
                return Err(RoutingError::ReservedSelector { selector });
            }

            let target = change.target();
            match claims.get(&selector) {
                Some(prev) if *prev == target => continue,
                Some(prev) => {
                    return Err(RoutingError::DuplicateRouteClaim {
                        selector,
                        first: *prev,
                        second: target,
                    })
                }
                None => {}
            }

            let live = self.bound(selector);
            match (target, live) {
                // Add / Replace pointing where the route already points
                (Some(new), Some(existing)) if new == existing => {}
                (Some(new), Some(existing)) => {
                    if matches!(change, crate::RouteChange::Add { .. }) {
                        return Err(RoutingError::DuplicateRouteClaim {
                            selector,
                            first: Some(existing),
                            second: Some(new),
                        });
                    }
                }
                (Some(_), None) => {
                    if matches!(change, crate::RouteChange::Replace { .. }) {
                        return Err(RoutingError::RouteNotFound { selector });
                    }
                }
                (None, Some(_)) => {}
                (None, None) => return Err(RoutingError::RouteNotFound { selector }),
            }

            claims.insert(selector, target);
            order.push(selector);
        }

        let mut next = self.clone();
        let mut rebindings = Vec::new();
        for selector in order {
            let target = claims[&selector];
            let old = self.bound(selector);
            if old == target {
                continue;
            }
            let slot = target.map_or(RouteSlot::Tombstone, RouteSlot::Bound);
            next.entries.insert(selector, slot);
            rebindings.push(Rebinding {
                selector: Some(selector),
                old,
                new: target,
            });
        }

        Ok((next, rebindings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sel(v: u32) -> Selector {
        Selector::from_u32(v)
    }

    #[test]
    fn single_pointer_routes_everything() {
        let target = ModuleId::new();
        let table = RoutingTable::single(target);
        assert_eq!(table.resolve(sel(1)), Some(target));
        assert_eq!(table.resolve(sel(999)), Some(target));
        assert_eq!(table.resolve(Selector::NONE), Some(target));
        assert_eq!(table.resolve(Selector::reserved(1)), None);
    }

    #[test]
    fn single_pointer_rejects_batches() {
        let table = RoutingTable::single(ModuleId::new());
        let err = table.apply(&RouteBatch::new().add(1, ModuleId::new())).unwrap_err();
        assert_eq!(
            err,
            RoutingError::ModeMismatch {
                mode: RoutingMode::SinglePointer
            }
        );
    }

    #[test]
    fn multi_entry_falls_back_to_default() {
        let default = ModuleId::new();
        let facet = ModuleId::new();
        let (table, rebindings) = RoutingTable::multi(Some(default))
            .apply(&RouteBatch::new().add(4, facet))
            .unwrap();

        assert_eq!(table.resolve(sel(4)), Some(facet));
        assert_eq!(table.resolve(sel(5)), Some(default));
        assert_eq!(rebindings.len(), 1);
        assert_eq!(rebindings[0].old, None);
        assert_eq!(rebindings[0].new, Some(facet));
    }

    #[test]
    fn duplicate_claim_in_batch_is_rejected() {
        let base = RoutingTable::multi(None);
        let (a, b) = (ModuleId::new(), ModuleId::new());
        let err = base
            .apply(&RouteBatch::new().add(4, a).add(4, b))
            .unwrap_err();

        assert_eq!(
            err,
            RoutingError::DuplicateRouteClaim {
                selector: sel(4),
                first: Some(a),
                second: Some(b),
            }
        );
        assert_eq!(base.resolve(sel(4)), None);
    }

    #[test]
    fn repeated_identical_claim_is_idempotent() {
        let a = ModuleId::new();
        let (table, rebindings) = RoutingTable::multi(None)
            .apply(&RouteBatch::new().add(4, a).add(4, a))
            .unwrap();
        assert_eq!(table.resolve(sel(4)), Some(a));
        assert_eq!(rebindings.len(), 1);
    }

    #[test]
    fn remove_mixed_with_claim_is_rejected() {
        let a = ModuleId::new();
        let (table, _) = RoutingTable::multi(None)
            .apply(&RouteBatch::new().add(4, a))
            .unwrap();
        let b = ModuleId::new();
        for batch in [
            RouteBatch::new().remove(4).replace(4, b),
            RouteBatch::new().remove(4).add(4, b),
        ] {
            assert_eq!(
                table.apply(&batch).unwrap_err(),
                RoutingError::DuplicateRouteClaim {
                    selector: sel(4),
                    first: None,
                    second: Some(b),
                }
            );
        }
    }

    #[test]
    fn add_over_live_route_is_rejected() {
        let (a, b) = (ModuleId::new(), ModuleId::new());
        let (table, _) = RoutingTable::multi(None)
            .apply(&RouteBatch::new().add(4, a))
            .unwrap();

        assert!(matches!(
            table.apply(&RouteBatch::new().add(4, b)),
            Err(RoutingError::DuplicateRouteClaim { .. })
        ));
        let (same, rebindings) = table.apply(&RouteBatch::new().add(4, a)).unwrap();
        assert_eq!(same, table);
        assert!(rebindings.is_empty());
    }

    #[test]
    fn remove_tombstones_instead_of_falling_through() {
        let default = ModuleId::new();
        let facet = ModuleId::new();
        let (table, _) = RoutingTable::multi(Some(default))
            .apply(&RouteBatch::new().add(4, facet))
            .unwrap();
        let (table, rebindings) = table.apply(&RouteBatch::new().remove(4)).unwrap();

        assert_eq!(table.resolve(sel(4)), None);
        assert_eq!(table.slot(sel(4)), Some(RouteSlot::Tombstone));
        assert_eq!(rebindings[0].new, None);

        // Tombstoned selector can be routed again
        let (table, _) = table.apply(&RouteBatch::new().add(4, facet)).unwrap();
        assert_eq!(table.resolve(sel(4)), Some(facet));
    }

    #[test]
    fn replace_and_remove_require_live_route() {
        let table = RoutingTable::multi(Some(ModuleId::new()));
        assert_eq!(
            table.apply(&RouteBatch::new().remove(9)).unwrap_err(),
            RoutingError::RouteNotFound { selector: sel(9) }
        );
        assert_eq!(
            table
                .apply(&RouteBatch::new().replace(9, ModuleId::new()))
                .unwrap_err(),
            RoutingError::RouteNotFound { selector: sel(9) }
        );
    }

    #[test]
    fn reserved_selectors_cannot_be_routed() {
        let table = RoutingTable::multi(None);
        assert!(matches!(
            table.apply(&RouteBatch::new().add(Selector::reserved(2), ModuleId::new())),
            Err(RoutingError::ReservedSelector { .. })
        ));
        assert!(matches!(
            table.apply(&RouteBatch::new().add(Selector::NONE, ModuleId::new())),
            Err(RoutingError::ReservedSelector { .. })
        ));
    }

    #[test]
    fn failed_batch_leaves_table_untouched() {
        let a = ModuleId::new();
        let table = RoutingTable::multi(None);
        let before = table.clone();
        let _ = table.apply(&RouteBatch::new().add(1, a).remove(2));
        assert_eq!(table, before);
    }

    #[test]
    fn with_default_reports_rebinding() {
        let (v1, v2) = (ModuleId::new(), ModuleId::new());
        let table = RoutingTable::single(v1);
        let (next, rebinding) = table.with_default(v2);
        assert_eq!(next.resolve(sel(1)), Some(v2));
        assert_eq!(
            rebinding,
            Some(Rebinding {
                selector: None,
                old: Some(v1),
                new: Some(v2),
            })
        );
        assert_eq!(next.with_default(v2).1, None);
    }

    #[test]
    fn routed_modules_are_distinct() {
        let (d, a) = (ModuleId::new(), ModuleId::new());
        let (table, _) = RoutingTable::multi(Some(d))
            .apply(&RouteBatch::new().add(1, a).add(2, a).add(3, d))
            .unwrap();
        let routed = table.routed_modules();
        assert_eq!(routed.len(), 2);
        assert!(routed.contains(&a) && routed.contains(&d));
    }

    proptest! {
        #[test]
        fn prop_resolve_is_total_and_stable(
            routed in prop::collection::btree_set(1u32..64, 0..16),
            probe in 1u32..128,
        ) {
            let facet = ModuleId::new();
            let default = ModuleId::new();
            let batch = routed
                .iter()
                .fold(RouteBatch::new(), |b, s| b.add(*s, facet));
            let (table, _) = RoutingTable::multi(Some(default)).apply(&batch).unwrap();

            let first = table.resolve(sel(probe));
            prop_assert_eq!(first, table.resolve(sel(probe)));
            let expected = if routed.contains(&probe) { facet } else { default };
            prop_assert_eq!(first, Some(expected));
        }

        #[test]
        fn prop_add_then_remove_resolves_nothing(selector in 1u32..10_000) {
            let (table, _) = RoutingTable::multi(Some(ModuleId::new()))
                .apply(&RouteBatch::new().add(selector, ModuleId::new()))
                .unwrap();
            let (table, _) = table.apply(&RouteBatch::new().remove(selector)).unwrap();
            prop_assert_eq!(table.resolve(sel(selector)), None);
        }
    }
}
