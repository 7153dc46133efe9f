//! Upgrade audit log
//!
//! Append-only record of every committed route change. Records are chained
//! with SHA-256: each hash covers the record's fields and the previous
//! record's hash, so any edit or removal breaks verification.

use crate::error::AuditError;
use hotswap_module::{Identity, ModuleId, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One committed route change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    /// Position in the log, from zero
    pub sequence: u64,
    /// Selector changed; `None` for the default entry
    pub selector: Option<Selector>,
    /// Previous target
    pub old_module: Option<ModuleId>,
    /// New target; `None` when the selector was removed
    pub new_module: Option<ModuleId>,
    /// Identity that requested the change
    pub initiator: Identity,
    /// Hash of the previous record (zero for the first)
    #[serde(with = "hex_bytes")]
    pub prev_hash: [u8; 32],
    /// Hash of this record
    #[serde(with = "hex_bytes")]
    pub hash: [u8; 32],
}

impl UpgradeRecord {
    fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        match self.selector {
            Some(selector) => {
                hasher.update([1u8]);
                hasher.update(selector.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        for module in [self.old_module, self.new_module] {
            match module {
                Some(id) => {
                    hasher.update([1u8]);
                    hasher.update(id.0.as_bytes());
                }
                None => hasher.update([0u8]),
            }
        }
        hasher.update(self.initiator.0.as_bytes());
        hasher.update(self.prev_hash);
        hasher.finalize().into()
    }

    /// Short hex form of the record hash
    #[must_use]
    pub fn short_hash(&self) -> String {
        hex::encode(&self.hash[..8])
    }
}

/// Hash-chained log of upgrade records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLog {
    records: Vec<UpgradeRecord>,
}

impl UpgradeLog {
    /// Create new empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, chaining it to the last one
    pub fn append(
        &mut self,
        selector: Option<Selector>,
        old_module: Option<ModuleId>,
        new_module: Option<ModuleId>,
        initiator: Identity,
    ) -> &UpgradeRecord {
        let prev_hash = self.records.last().map_or([0u8; 32], |r| r.hash);
        let mut record = UpgradeRecord {
            sequence: self.records.len() as u64,
            selector,
            old_module,
            new_module,
            initiator,
            prev_hash,
            hash: [0u8; 32],
        };
        record.hash = record.compute_hash();
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// All records, oldest first
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[UpgradeRecord] {
        &self.records
    }

    /// Most recent record
    #[must_use]
    pub fn last(&self) -> Option<&UpgradeRecord> {
        self.records.last()
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the log is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records appended after `len`; used only to discard uncommitted work
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    /// Verify the hash chain
    ///
    /// # Errors
    /// [`AuditError::IntegrityViolation`] naming the first bad record.
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let mut prev = [0u8; 32];
        for (index, record) in self.records.iter().enumerate() {
            let sequence = index as u64;
            if record.sequence != sequence
                || record.prev_hash != prev
                || record.hash != record.compute_hash()
            {
                return Err(AuditError::IntegrityViolation { sequence });
            }
            prev = record.hash;
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let raw = hex::decode(&text).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
