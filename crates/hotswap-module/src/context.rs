//! Forwarded call context
//!
//! A module never sees the dispatcher directly. Each entry point receives a
//! [`CallContext`]: the original caller, the payload and a handle to the
//! host, which resolves storage against the dispatcher's own slots within
//! the module's lease.

use crate::fault::ModuleFault;
use crate::ids::{DispatcherAddress, Identity, ModuleId, Selector, Word};
use hotswap_layout::StorageLayout;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Services the dispatcher provides to running module code
///
/// Implementations enforce the storage lease and charge the invocation
/// budget; module code reaches them only through [`CallContext`].
pub trait Host {
    /// Dispatcher whose storage this call runs against
    fn dispatcher(&self) -> DispatcherAddress;

    /// Layout of the module currently executing
    fn lease(&self) -> &StorageLayout;

    /// Read a slot
    ///
    /// # Errors
    /// [`ModuleFault::LeaseViolation`] outside the lease,
    /// [`ModuleFault::BudgetExhausted`] when out of budget.
    fn load(&mut self, slot: u64) -> Result<Word, ModuleFault>;

    /// Write a slot
    ///
    /// # Errors
    /// Same as [`Host::load`].
    fn store(&mut self, slot: u64, value: Word) -> Result<(), ModuleFault>;

    /// Consume budget units for module-side work
    ///
    /// # Errors
    /// [`ModuleFault::BudgetExhausted`] when the budget is spent.
    fn charge(&mut self, units: u64) -> Result<(), ModuleFault>;

    /// Invoke the owning dispatcher again, as the dispatcher itself
    ///
    /// # Errors
    /// [`ModuleFault::Reentry`] wrapping the dispatcher's error.
    fn reenter(&mut self, selector: Selector, payload: &[u8]) -> Result<Vec<u8>, ModuleFault>;
}

/// Invocation record passed by reference into every module entry point
pub struct CallContext<'a> {
    caller: Identity,
    payload: &'a [u8],
    host: &'a mut dyn Host,
}

impl<'a> CallContext<'a> {
    /// Create new context
    pub fn new(caller: Identity, payload: &'a [u8], host: &'a mut dyn Host) -> Self {
        Self {
            caller,
            payload,
            host,
        }
    }

    /// Original caller of the dispatcher
    #[inline]
    #[must_use]
    pub fn caller(&self) -> Identity {
        self.caller
    }

    /// Call payload
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    /// Dispatcher whose storage is in use
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherAddress {
        self.host.dispatcher()
    }

    /// Declared layout of the running module
    #[inline]
    #[must_use]
    pub fn lease(&self) -> &StorageLayout {
        self.host.lease()
    }

    /// Read a raw slot
    ///
    /// # Errors
    /// See [`Host::load`].
    #[inline]
    pub fn load(&mut self, slot: u64) -> Result<Word, ModuleFault> {
        self.host.load(slot)
    }

    /// Write a raw slot
    ///
    /// # Errors
    /// See [`Host::store`].
    #[inline]
    pub fn store(&mut self, slot: u64, value: Word) -> Result<(), ModuleFault> {
        self.host.store(slot, value)
    }

    /// Read the first slot of a named field
    ///
    /// # Errors
    /// [`ModuleFault::UnknownField`] if the tag is not declared.
    pub fn field(&mut self, tag: &str) -> Result<Word, ModuleFault> {
        let slot = self.field_slot(tag)?;
        self.host.load(slot)
    }

    /// Write the first slot of a named field
    ///
    /// # Errors
    /// [`ModuleFault::UnknownField`] if the tag is not declared.
    pub fn set_field(&mut self, tag: &str, value: Word) -> Result<(), ModuleFault> {
        let slot = self.field_slot(tag)?;
        self.host.store(slot, value)
    }

    /// Read a named field as an integer
    ///
    /// # Errors
    /// See [`CallContext::field`].
    pub fn field_u64(&mut self, tag: &str) -> Result<u64, ModuleFault> {
        self.field(tag).map(|w| w.as_u64())
    }

    /// Write a named field as an integer
    ///
    /// # Errors
    /// See [`CallContext::set_field`].
    pub fn set_field_u64(&mut self, tag: &str, value: u64) -> Result<(), ModuleFault> {
        self.set_field(tag, Word::from_u64(value))
    }

    /// Spend budget units
    ///
    /// # Errors
    /// See [`Host::charge`].
    #[inline]
    pub fn charge(&mut self, units: u64) -> Result<(), ModuleFault> {
        self.host.charge(units)
    }

    /// Call back into the owning dispatcher
    ///
    /// # Errors
    /// See [`Host::reenter`].
    #[inline]
    pub fn reenter(&mut self, selector: Selector, payload: &[u8]) -> Result<Vec<u8>, ModuleFault> {
        self.host.reenter(selector, payload)
    }

    fn field_slot(&self, tag: &str) -> Result<u64, ModuleFault> {
        self.host
            .lease()
            .region(tag)
            .map(|r| r.offset)
            .ok_or_else(|| ModuleFault::UnknownField(tag.to_string()))
    }
}

/// Governance change a self-authorizing module is asked to approve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposedAction {
    /// Replace the default target
    Upgrade {
        /// Proposed module
        to: ModuleId,
    },
    /// Apply a routing batch; `None` removes the selector
    Cut {
        /// Selector claims in batch order
        changes: Vec<(Selector, Option<ModuleId>)>,
    },
    /// Give up upgrade authority for good
    RenounceAdmin,
    /// Hand admin authority to another identity
    TransferAdmin {
        /// New admin
        to: Identity,
    },
    /// Stop the dispatcher permanently
    Freeze,
}

/// Request passed to [`crate::ModuleCode::authorize_upgrade`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeProposal {
    /// Dispatcher being governed
    pub dispatcher: DispatcherAddress,
    /// Current default target
    pub current: Option<ModuleId>,
    /// Requested change
    pub action: ProposedAction,
}

impl UpgradeProposal {
    /// Canonical digest for signing schemes
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.dispatcher.0.as_bytes());
        match self.current {
            Some(id) => {
                hasher.update([1u8]);
                hasher.update(id.0.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        match &self.action {
            ProposedAction::Upgrade { to } => {
                hasher.update([1u8]);
                hasher.update(to.0.as_bytes());
            }
            ProposedAction::Cut { changes } => {
                hasher.update([2u8]);
                hasher.update((changes.len() as u64).to_le_bytes());
                for (selector, target) in changes {
                    hasher.update(selector.as_bytes());
                    match target {
                        Some(id) => hasher.update(id.0.as_bytes()),
                        None => hasher.update([0u8; 16]),
                    }
                }
            }
            ProposedAction::RenounceAdmin => hasher.update([3u8]),
            ProposedAction::TransferAdmin { to } => {
                hasher.update([4u8]);
                hasher.update(to.0.as_bytes());
            }
            ProposedAction::Freeze => hasher.update([5u8]),
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapHost {
        address: DispatcherAddress,
        lease: StorageLayout,
        slots: HashMap<u64, Word>,
    }

    impl Host for MapHost {
        fn dispatcher(&self) -> DispatcherAddress {
            self.address
        }

        fn lease(&self) -> &StorageLayout {
            &self.lease
        }

        fn load(&mut self, slot: u64) -> Result<Word, ModuleFault> {
            if !self.lease.covers(slot) {
                return Err(ModuleFault::LeaseViolation { slot });
            }
            Ok(self.slots.get(&slot).copied().unwrap_or_default())
        }

        fn store(&mut self, slot: u64, value: Word) -> Result<(), ModuleFault> {
            if !self.lease.covers(slot) {
                return Err(ModuleFault::LeaseViolation { slot });
            }
            self.slots.insert(slot, value);
            Ok(())
        }

        fn charge(&mut self, _units: u64) -> Result<(), ModuleFault> {
            Ok(())
        }

        fn reenter(&mut self, _selector: Selector, _payload: &[u8]) -> Result<Vec<u8>, ModuleFault> {
            Err(ModuleFault::Unsupported("reenter"))
        }
    }

    fn host() -> MapHost {
        MapHost {
            address: DispatcherAddress::new(),
            lease: StorageLayout::builder().field("x", 1).field("y", 1).build().unwrap(),
            slots: HashMap::new(),
        }
    }

    #[test]
    fn fields_resolve_through_lease() {
        let mut host = host();
        let caller = Identity::new();
        let mut cx = CallContext::new(caller, b"", &mut host);

        cx.set_field_u64("y", 7).unwrap();
        assert_eq!(cx.field_u64("y").unwrap(), 7);
        assert_eq!(cx.field_u64("x").unwrap(), 0);
        assert_eq!(cx.caller(), caller);
        assert_eq!(host.slots.get(&1).map(Word::as_u64), Some(7));
    }

    #[test]
    fn unknown_field_is_reported() {
        let mut host = host();
        let mut cx = CallContext::new(Identity::new(), b"", &mut host);
        assert!(matches!(cx.field("z"), Err(ModuleFault::UnknownField(_))));
    }

    #[test]
    fn proposal_digest_binds_action() {
        let dispatcher = DispatcherAddress::new();
        let to = ModuleId::new();
        let upgrade = UpgradeProposal {
            dispatcher,
            current: None,
            action: ProposedAction::Upgrade { to },
        };
        let freeze = UpgradeProposal {
            action: ProposedAction::Freeze,
            ..upgrade.clone()
        };
        assert_eq!(upgrade.digest(), upgrade.clone().digest());
        assert_ne!(upgrade.digest(), freeze.digest());
    }

    #[test]
    fn proposal_survives_json_transport() {
        // Signers receive proposals out of band and sign the digest
        let proposal = UpgradeProposal {
            dispatcher: DispatcherAddress::new(),
            current: Some(ModuleId::new()),
            action: ProposedAction::Cut {
                changes: vec![
                    (Selector::from_u32(7), Some(ModuleId::new())),
                    (Selector::from_u32(8), None),
                ],
            },
        };

        let json = serde_json::to_string(&proposal).unwrap();
        let back: UpgradeProposal = serde_json::from_str(&json).unwrap();

        assert_eq!(back, proposal);
        assert_eq!(back.digest(), proposal.digest());
    }
}
