//! Layout compatibility validation
//!
//! Two checks guard every routing mutation:
//! - [`LayoutValidator::check_compatible`]: an upgrade may only append
//!   regions to the layout it replaces
//! - [`LayoutValidator::check_disjoint`]: modules routed side by side must
//!   not claim intersecting slots

use crate::region::{Region, StorageLayout};
use std::fmt::Display;

/// Reason an upgrade from one layout to another is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Incompatibility {
    /// A region of the old layout is gone
    #[error("region '{0}' is missing from the new layout")]
    Missing(Region),

    /// Same tag, different offset
    #[error("region '{tag}' moved from slot {old_offset} to {new_offset}")]
    Moved {
        /// Region tag
        tag: String,
        /// Offset in the old layout
        old_offset: u64,
        /// Offset in the new layout
        new_offset: u64,
    },

    /// Same tag and offset, different width
    #[error("region '{tag}' resized from {old_width} to {new_width} slots")]
    Resized {
        /// Region tag
        tag: String,
        /// Width in the old layout
        old_width: u64,
        /// Width in the new layout
        new_width: u64,
    },

    /// Same slots, different semantic tag
    #[error("slots of '{old_tag}' retagged as '{new_tag}'")]
    Retagged {
        /// Tag in the old layout
        old_tag: String,
        /// Tag in the new layout
        new_tag: String,
    },

    /// A new region sits inside the old layout's span
    #[error("new region '{0}' is interleaved with existing regions")]
    Interleaved(Region),
}

/// Layout validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Descriptor violates its own invariants
    #[error("malformed layout: {reason}")]
    Malformed {
        /// What is wrong
        reason: String,
    },

    /// Upgrade would reinterpret existing storage
    #[error("incompatible layout: {0}")]
    Incompatible(#[from] Incompatibility),

    /// Two routed modules claim intersecting slots
    #[error("overlapping storage claims: '{first}' {first_region} and '{second}' {second_region}")]
    OverlappingClaims {
        /// First claimant
        first: String,
        /// Region of the first claimant
        first_region: Region,
        /// Second claimant
        second: String,
        /// Region of the second claimant
        second_region: Region,
    },
}

impl LayoutError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Storage layout validator
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutValidator;

impl LayoutValidator {
    /// Create new validator instance
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check if `new` may replace `old` without reinterpreting storage
    #[inline]
    #[must_use]
    pub fn is_compatible(old: &StorageLayout, new: &StorageLayout) -> bool {
        Self::check_compatible(old, new).is_ok()
    }

    /// Compatibility check with diagnostics
    ///
    /// Every region of `old` must appear in `new` at the same position with
    /// identical offset, width and tag. Regions beyond `old`'s length must
    /// start at or after `old.end()`.
    ///
    /// # Errors
    /// Returns the first [`Incompatibility`] found.
    pub fn check_compatible(
        old: &StorageLayout,
        new: &StorageLayout,
    ) -> Result<(), Incompatibility> {
        let new_regions = new.regions();

        for (i, before) in old.regions().iter().enumerate() {
            let Some(after) = new_regions.get(i) else {
                return Err(Incompatibility::Missing(before.clone()));
            };
            if after == before {
                continue;
            }
            return Err(Self::diagnose(before, after, new));
        }

        let old_end = old.end();
        if let Some(interleaved) = new_regions[old.len()..]
            .iter()
            .find(|r| r.offset < old_end)
        {
            return Err(Incompatibility::Interleaved(interleaved.clone()));
        }

        Ok(())
    }

    fn diagnose(before: &Region, after: &Region, new: &StorageLayout) -> Incompatibility {
        // Prefer describing what happened to the old region's tag
        match new.region(before.tag.as_str()) {
            Some(moved) if moved.offset != before.offset => Incompatibility::Moved {
                tag: before.tag.to_string(),
                old_offset: before.offset,
                new_offset: moved.offset,
            },
            Some(resized) if resized.width != before.width => Incompatibility::Resized {
                tag: before.tag.to_string(),
                old_width: before.width,
                new_width: resized.width,
            },
            Some(_) => Incompatibility::Interleaved(after.clone()),
            None if after.offset == before.offset && after.width == before.width => {
                Incompatibility::Retagged {
                    old_tag: before.tag.to_string(),
                    new_tag: after.tag.to_string(),
                }
            }
            None => Incompatibility::Missing(before.clone()),
        }
    }

    /// Check a layout against regions left behind by modules no longer routed
    ///
    /// Storage written through a retired region keeps its value, so a new
    /// claim may only reuse it verbatim: same offset, width and tag.
    ///
    /// # Errors
    /// Returns the first [`Incompatibility`] between a region of `new` and
    /// an intersecting retired region.
    pub fn check_retired<'a, I>(retired: I, new: &StorageLayout) -> Result<(), Incompatibility>
    where
        I: IntoIterator<Item = &'a Region>,
    {
        let retired: Vec<&Region> = retired.into_iter().collect();
        for region in new.regions() {
            if let Some(old) = retired
                .iter()
                .find(|old| old.intersects(region) && **old != region)
            {
                return Err(Self::diagnose_reuse(old, region));
            }
        }
        Ok(())
    }

    fn diagnose_reuse(old: &Region, new: &Region) -> Incompatibility {
        if old.tag == new.tag {
            if old.offset == new.offset {
                Incompatibility::Resized {
                    tag: old.tag.to_string(),
                    old_width: old.width,
                    new_width: new.width,
                }
            } else {
                Incompatibility::Moved {
                    tag: old.tag.to_string(),
                    old_offset: old.offset,
                    new_offset: new.offset,
                }
            }
        } else if old.offset == new.offset && old.width == new.width {
            Incompatibility::Retagged {
                old_tag: old.tag.to_string(),
                new_tag: new.tag.to_string(),
            }
        } else {
            Incompatibility::Interleaved(new.clone())
        }
    }

    /// Check that no two layouts claim intersecting slots
    #[must_use]
    pub fn no_overlap<'a, I>(layouts: I) -> bool
    where
        I: IntoIterator<Item = &'a StorageLayout>,
    {
        let claims: Vec<(usize, &StorageLayout)> = layouts.into_iter().enumerate().collect();
        Self::check_disjoint(&claims).is_ok()
    }

    /// Disjointness check with diagnostics
    ///
    /// Sort-and-sweep over all claimed regions: O(n log n) in the total
    /// number of regions.
    ///
    /// # Errors
    /// Returns [`LayoutError::OverlappingClaims`] naming the first
    /// intersecting pair.
    pub fn check_disjoint<K: Display>(claims: &[(K, &StorageLayout)]) -> Result<(), LayoutError> {
        let mut spans: Vec<(usize, &Region)> = claims
            .iter()
            .enumerate()
            .flat_map(|(owner, (_, layout))| layout.regions().iter().map(move |r| (owner, r)))
            .collect();
        spans.sort_by_key(|(_, r)| (r.offset, r.end()));

        // Region with the furthest end seen so far; regions of one layout
        // never overlap each other, so any hit is a cross-claim conflict.
        let mut reach: Option<(usize, &Region)> = None;
        for (owner, region) in spans {
            if let Some((prev_owner, prev)) = reach {
                if region.offset < prev.end() {
                    return Err(LayoutError::OverlappingClaims {
                        first: claims[prev_owner].0.to_string(),
                        first_region: prev.clone(),
                        second: claims[owner].0.to_string(),
                        second_region: region.clone(),
                    });
                }
            }
            if reach.map_or(true, |(_, prev)| region.end() > prev.end()) {
                reach = Some((owner, region));
            }
        }
        Ok(())
    }
}
