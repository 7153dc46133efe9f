//! Dispatcher instance state
//!
//! Everything an invocation may change lives in [`Instance`]: storage,
//! routing, admin, lifecycle and the upgrade log. A [`Snapshot`] captures
//! enough of it to undo an aborted invocation exactly.

use crate::audit::UpgradeLog;
use crate::beacon::{Beacon, BeaconView};
use crate::lifecycle::Lifecycle;
use crate::storage::{Checkpoint, Storage};
use hotswap_layout::Region;
use hotswap_module::{Identity, ModuleId, Selector};
use hotswap_routing::{RoutingMode, RoutingTable};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Who may govern a dispatcher
#[derive(Clone)]
pub enum TrustModel {
    /// A single admin identity stored on the dispatcher
    ExternalAdmin,
    /// The default-route module approves each change itself
    SelfAuthorizing,
    /// Routing follows a shared beacon; only the beacon can be upgraded
    Beacon(Arc<Beacon>),
}

impl fmt::Debug for TrustModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternalAdmin => f.write_str("ExternalAdmin"),
            Self::SelfAuthorizing => f.write_str("SelfAuthorizing"),
            Self::Beacon(beacon) => write!(f, "Beacon({})", beacon.id()),
        }
    }
}

/// Governance rule fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Governance {
    Admin,
    SelfAuthorizing,
    Beacon,
    Immutable,
}

#[derive(Debug, Clone)]
pub(crate) enum Routing {
    Table(Arc<RoutingTable>),
    Beacon { beacon: Arc<Beacon>, view: BeaconView },
    Fixed(ModuleId),
}

impl Routing {
    pub(crate) fn resolve(&self, selector: Selector) -> Option<ModuleId> {
        match self {
            Self::Table(table) => table.resolve(selector),
            Self::Beacon { view, .. } => (!selector.is_reserved()).then_some(view.module),
            Self::Fixed(module) => (!selector.is_reserved()).then_some(*module),
        }
    }

    /// Target of the default entry; also the governing module when self-authorizing
    pub(crate) fn default_target(&self) -> Option<ModuleId> {
        match self {
            Self::Table(table) => table.default_target(),
            Self::Beacon { view, .. } => Some(view.module),
            Self::Fixed(module) => Some(*module),
        }
    }

    pub(crate) fn mode(&self) -> RoutingMode {
        match self {
            Self::Table(table) => table.mode(),
            Self::Beacon { .. } | Self::Fixed(_) => RoutingMode::SinglePointer,
        }
    }

    /// Pull the beacon's latest target; only called between top-level invocations
    pub(crate) fn refresh(&mut self) {
        if let Self::Beacon { beacon, view } = self {
            *view = beacon.view();
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Control {
    pub(crate) routing: Routing,
    pub(crate) admin: Option<Identity>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) renounced: bool,
    /// Regions of modules that were routed once and no longer are, by offset
    pub(crate) retired: BTreeMap<u64, Region>,
}

impl Control {
    pub(crate) fn transition(&mut self, to: Lifecycle) -> Result<(), crate::DispatchError> {
        self.lifecycle.validate_transition(to)?;
        self.lifecycle = to;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Instance {
    pub(crate) storage: Storage,
    pub(crate) control: Control,
    pub(crate) log: UpgradeLog,
}

pub(crate) struct Snapshot {
    checkpoint: Checkpoint,
    control: Control,
    log_len: usize,
}

impl Instance {
    pub(crate) fn new(routing: Routing, lifecycle: Lifecycle) -> Self {
        Self {
            storage: Storage::default(),
            control: Control {
                routing,
                admin: None,
                lifecycle,
                renounced: false,
                retired: BTreeMap::new(),
            },
            log: UpgradeLog::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            checkpoint: self.storage.checkpoint(),
            control: self.control.clone(),
            log_len: self.log.len(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.storage.revert_to(snapshot.checkpoint);
        self.control = snapshot.control;
        self.log.truncate(snapshot.log_len);
    }

    pub(crate) fn commit(&mut self) {
        self.storage.commit();
    }
}
