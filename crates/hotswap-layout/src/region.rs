//! Storage regions and layout descriptors
//!
//! A [`StorageLayout`] is the ordered list of slot regions a module reads
//! and writes. Slots are addressed by a `u64` offset; a region covers the
//! half-open slot range `[offset, offset + width)`.

use crate::validator::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Semantic name of a storage region (`"balance"`, `"owner"`, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotTag(String);

impl SlotTag {
    /// Create new tag
    #[inline]
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SlotTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One declared storage region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// First slot of the region
    pub offset: u64,
    /// Number of slots covered
    pub width: u64,
    /// Semantic tag
    pub tag: SlotTag,
}

impl Region {
    /// Create new region
    #[inline]
    #[must_use]
    pub fn new(offset: u64, width: u64, tag: impl Into<SlotTag>) -> Self {
        Self {
            offset,
            width,
            tag: tag.into(),
        }
    }

    /// One past the last slot of the region
    #[inline]
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.width)
    }

    /// Check if `slot` falls inside this region
    #[inline]
    #[must_use]
    pub fn contains(&self, slot: u64) -> bool {
        slot >= self.offset && slot < self.end()
    }

    /// Check if two regions share at least one slot
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@[{}..{})", self.tag, self.offset, self.end())
    }
}

/// Storage layout descriptor
///
/// Invariants, enforced at construction:
/// - every region has non-zero width
/// - tags are unique
/// - regions are sorted by offset and never overlap each other
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct StorageLayout {
    regions: Vec<Region>,
}

impl StorageLayout {
    /// Empty layout (a module that touches no storage)
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a layout by appending fields
    #[inline]
    #[must_use]
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// Create a layout from explicit regions
    ///
    /// # Errors
    /// Returns [`LayoutError::Malformed`] if the regions violate the
    /// descriptor invariants.
    pub fn from_regions(regions: Vec<Region>) -> Result<Self, LayoutError> {
        for (i, region) in regions.iter().enumerate() {
            if region.width == 0 {
                return Err(LayoutError::malformed(format!(
                    "region '{}' has zero width",
                    region.tag
                )));
            }
            if region.offset.checked_add(region.width).is_none() {
                return Err(LayoutError::malformed(format!(
                    "region '{}' overflows the slot space",
                    region.tag
                )));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &regions[p]) {
                if region.offset < prev.end() {
                    return Err(LayoutError::malformed(format!(
                        "region '{region}' overlaps or precedes '{prev}'"
                    )));
                }
            }
            if regions[..i].iter().any(|r| r.tag == region.tag) {
                return Err(LayoutError::malformed(format!(
                    "duplicate tag '{}'",
                    region.tag
                )));
            }
        }
        Ok(Self { regions })
    }

    /// Declared regions, in order
    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Number of regions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if no regions are declared
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// One past the highest declared slot (0 for an empty layout)
    #[inline]
    #[must_use]
    pub fn end(&self) -> u64 {
        self.regions.last().map_or(0, Region::end)
    }

    /// Find a region by tag
    #[must_use]
    pub fn region(&self, tag: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.tag.as_str() == tag)
    }

    /// Find the region covering `slot`
    #[must_use]
    pub fn region_at(&self, slot: u64) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.end() <= slot);
        self.regions.get(idx).filter(|r| r.contains(slot))
    }

    /// Check if `slot` is covered by any declared region
    #[inline]
    #[must_use]
    pub fn covers(&self, slot: u64) -> bool {
        self.region_at(slot).is_some()
    }

    /// Canonical byte encoding used for content digests
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.regions.len() * 24);
        for region in &self.regions {
            out.extend_from_slice(&region.offset.to_le_bytes());
            out.extend_from_slice(&region.width.to_le_bytes());
            out.extend_from_slice(region.tag.as_str().as_bytes());
            out.push(0);
        }
        out
    }
}

impl<'de> Deserialize<'de> for StorageLayout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            regions: Vec<Region>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::from_regions(raw.regions).map_err(serde::de::Error::custom)
    }
}

/// Appends fields at the next free slot
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    regions: Vec<Region>,
    next: u64,
}

impl LayoutBuilder {
    /// Append a field of `width` slots
    #[must_use]
    pub fn field(mut self, tag: impl Into<SlotTag>, width: u64) -> Self {
        let region = Region::new(self.next, width, tag);
        self.next = region.end();
        self.regions.push(region);
        self
    }

    /// Leave `slots` unused slots before the next field
    #[must_use]
    pub fn gap(mut self, slots: u64) -> Self {
        self.next = self.next.saturating_add(slots);
        self
    }

    /// Start the next field at an absolute offset
    #[must_use]
    pub fn at(mut self, offset: u64) -> Self {
        self.next = offset;
        self
    }

    /// Finish the layout
    ///
    /// # Errors
    /// Returns [`LayoutError::Malformed`] on zero widths, duplicate tags or
    /// overlapping fields.
    pub fn build(self) -> Result<StorageLayout, LayoutError> {
        StorageLayout::from_regions(self.regions)
    }
}
