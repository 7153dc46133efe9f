//! Beacons
//!
//! A beacon is a shared, governed pointer to one module. Any number of
//! dispatchers reference the same beacon; upgrading it retargets all of
//! them. Each dispatcher reads a [`BeaconView`] at the start of every
//! top-level invocation, so an upgrade becomes visible to a dispatcher on
//! its next invocation and never in the middle of one.

use crate::audit::UpgradeLog;
use crate::error::DispatchError;
use hotswap_layout::{LayoutError, LayoutValidator};
use hotswap_module::{Identity, ModuleId, ModuleRegistry};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Unique identifier of a beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconId(pub Uuid);

impl BeaconId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BeaconId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "beacon:{}", self.0.simple())
    }
}

/// Snapshot of a beacon's target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconView {
    /// Current module
    pub module: ModuleId,
    /// Number of upgrades applied so far
    pub epoch: u64,
}

#[derive(Debug)]
struct BeaconState {
    module: ModuleId,
    admin: Option<Identity>,
    epoch: u64,
    log: UpgradeLog,
}

/// Shared upgradeable pointer to one module
#[derive(Debug)]
pub struct Beacon {
    id: BeaconId,
    registry: Arc<ModuleRegistry>,
    state: RwLock<BeaconState>,
}

impl Beacon {
    /// Create a beacon pointing at a deployed module
    ///
    /// # Errors
    /// [`DispatchError::UnknownModule`] if the module is not deployed.
    pub fn new(
        registry: Arc<ModuleRegistry>,
        module: ModuleId,
        admin: Identity,
    ) -> Result<Self, DispatchError> {
        if !registry.contains(module) {
            return Err(DispatchError::UnknownModule { module });
        }
        let id = BeaconId::new();
        info!(beacon = %id, %module, "beacon created");
        Ok(Self {
            id,
            registry,
            state: RwLock::new(BeaconState {
                module,
                admin: Some(admin),
                epoch: 0,
                log: UpgradeLog::new(),
            }),
        })
    }

    /// Beacon id
    #[inline]
    #[must_use]
    pub fn id(&self) -> BeaconId {
        self.id
    }

    /// Current module
    #[must_use]
    pub fn current_module(&self) -> ModuleId {
        self.state.read().module
    }

    /// Upgrades applied so far
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    /// Current admin, `None` once renounced
    #[must_use]
    pub fn admin(&self) -> Option<Identity> {
        self.state.read().admin
    }

    /// Consistent snapshot of module and epoch
    #[must_use]
    pub fn view(&self) -> BeaconView {
        let state = self.state.read();
        BeaconView {
            module: state.module,
            epoch: state.epoch,
        }
    }

    /// Copy of the beacon's upgrade log
    #[must_use]
    pub fn upgrade_log(&self) -> UpgradeLog {
        self.state.read().log.clone()
    }

    /// Retarget the beacon
    ///
    /// Upgrading to the current module is a no-op.
    ///
    /// # Errors
    /// - [`DispatchError::Unauthorized`] unless `caller` is the admin
    /// - [`DispatchError::UnknownModule`] if `module` is not deployed
    /// - [`DispatchError::LayoutIncompatible`] if the new layout does not
    ///   extend the current one
    pub fn upgrade(&self, caller: Identity, module: ModuleId) -> Result<(), DispatchError> {
        let mut state = self.state.write();
        if state.admin != Some(caller) {
            warn!(beacon = %self.id, %caller, "unauthorized beacon upgrade");
            return Err(DispatchError::Unauthorized);
        }
        if state.module == module {
            return Ok(());
        }

        let next = self
            .registry
            .get(module)
            .ok_or(DispatchError::UnknownModule { module })?;
        let current = self
            .registry
            .get(state.module)
            .ok_or(DispatchError::UnknownModule {
                module: state.module,
            })?;
        LayoutValidator::check_compatible(current.layout(), next.layout())
            .map_err(LayoutError::from)?;

        let old = state.module;
        state.module = module;
        state.epoch += 1;
        let record = state.log.append(None, Some(old), Some(module), caller);
        info!(
            beacon = %self.id,
            from = %old,
            to = %module,
            record = %record.short_hash(),
            "beacon upgraded"
        );
        Ok(())
    }

    /// Give up upgrade authority permanently
    ///
    /// # Errors
    /// [`DispatchError::Unauthorized`] unless `caller` is the admin.
    pub fn renounce_admin(&self, caller: Identity) -> Result<(), DispatchError> {
        let mut state = self.state.write();
        if state.admin != Some(caller) {
            return Err(DispatchError::Unauthorized);
        }
        state.admin = None;
        info!(beacon = %self.id, "beacon admin renounced");
        Ok(())
    }

    /// Hand upgrade authority to another identity
    ///
    /// # Errors
    /// [`DispatchError::Unauthorized`] unless `caller` is the admin.
    pub fn transfer_admin(&self, caller: Identity, to: Identity) -> Result<(), DispatchError> {
        let mut state = self.state.write();
        if state.admin != Some(caller) {
            return Err(DispatchError::Unauthorized);
        }
        state.admin = Some(to);
        info!(beacon = %self.id, new_admin = %to, "beacon admin transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_layout::StorageLayout;
    use hotswap_module::{CallContext, Module, ModuleCode, ModuleFault, Selector};

    struct Noop;

    impl ModuleCode for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn call(&self, _entry: Selector, _cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
            Ok(Vec::new())
        }
    }

    fn deploy(registry: &ModuleRegistry, fields: &[&str]) -> ModuleId {
        let layout = fields
            .iter()
            .fold(StorageLayout::builder(), |b, f| b.field(*f, 1))
            .build()
            .unwrap();
        registry.deploy(Module::new(Noop, layout))
    }

    #[test]
    fn admin_upgrade_bumps_epoch() {
        let registry = Arc::new(ModuleRegistry::new());
        let v1 = deploy(&registry, &["x"]);
        let v2 = deploy(&registry, &["x", "y"]);
        let admin = Identity::new();
        let beacon = Beacon::new(registry, v1, admin).unwrap();

        beacon.upgrade(admin, v2).unwrap();
        assert_eq!(beacon.view(), BeaconView { module: v2, epoch: 1 });
        assert_eq!(beacon.upgrade_log().len(), 1);
        assert!(beacon.upgrade_log().verify_integrity().is_ok());
    }

    #[test]
    fn non_admin_cannot_upgrade() {
        let registry = Arc::new(ModuleRegistry::new());
        let v1 = deploy(&registry, &["x"]);
        let v2 = deploy(&registry, &["x", "y"]);
        let beacon = Beacon::new(registry, v1, Identity::new()).unwrap();

        assert!(matches!(
            beacon.upgrade(Identity::new(), v2),
            Err(DispatchError::Unauthorized)
        ));
        assert_eq!(beacon.current_module(), v1);
        assert_eq!(beacon.epoch(), 0);
    }

    #[test]
    fn incompatible_layout_is_rejected() {
        let registry = Arc::new(ModuleRegistry::new());
        let v2 = deploy(&registry, &["x", "y"]);
        let v3 = deploy(&registry, &["y", "x"]);
        let admin = Identity::new();
        let beacon = Beacon::new(registry, v2, admin).unwrap();

        assert!(matches!(
            beacon.upgrade(admin, v3),
            Err(DispatchError::LayoutIncompatible(_))
        ));
        assert_eq!(beacon.current_module(), v2);
    }

    #[test]
    fn renounce_is_permanent() {
        let registry = Arc::new(ModuleRegistry::new());
        let v1 = deploy(&registry, &["x"]);
        let v2 = deploy(&registry, &["x", "y"]);
        let admin = Identity::new();
        let beacon = Beacon::new(registry, v1, admin).unwrap();

        beacon.renounce_admin(admin).unwrap();
        assert_eq!(beacon.admin(), None);
        assert!(beacon.upgrade(admin, v2).is_err());
        assert!(beacon.transfer_admin(admin, Identity::new()).is_err());
    }

    #[test]
    fn transfer_moves_authority() {
        let registry = Arc::new(ModuleRegistry::new());
        let v1 = deploy(&registry, &["x"]);
        let v2 = deploy(&registry, &["x", "y"]);
        let (old, new) = (Identity::new(), Identity::new());
        let beacon = Beacon::new(registry, v1, old).unwrap();

        beacon.transfer_admin(old, new).unwrap();
        assert!(beacon.upgrade(old, v2).is_err());
        beacon.upgrade(new, v2).unwrap();
        assert_eq!(beacon.current_module(), v2);
    }
}
