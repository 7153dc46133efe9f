//! Dispatcher
//!
//! The stable front end: owns storage and routing, forwards invocations to
//! modules and routes governance through the upgrade controller.
//!
//! Each top-level call holds the instance lock for its whole duration and
//! runs to completion. On success its storage journal is discarded; on any
//! error the instance is restored to the state it had before the call.

use crate::admin::AdminCall;
use crate::audit::UpgradeLog;
use crate::beacon::Beacon;
use crate::budget::Budget;
use crate::config::RuntimeConfig;
use crate::error::DispatchError;
use crate::frame::{Env, Frame};
use crate::instance::{Governance, Instance, Routing, TrustModel};
use crate::lifecycle::Lifecycle;
use hotswap_module::{DispatcherAddress, Identity, ModuleId, ModuleRegistry, Selector, Word};
use hotswap_routing::{RouteBatch, RoutingMode, RoutingTable};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Upgradeable dispatch front end
pub struct Dispatcher {
    env: Env,
    trust: Option<TrustModel>,
    instance: Mutex<Instance>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("address", &self.env.address)
            .field("trust", &self.trust)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create an uninitialized dispatcher with default configuration
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>, trust: TrustModel) -> Self {
        Self::with_config(registry, trust, RuntimeConfig::default())
    }

    /// Create an uninitialized dispatcher
    ///
    /// The routing mode comes from `config`; beacon dispatchers always
    /// route every selector to the beacon's module.
    #[must_use]
    pub fn with_config(
        registry: Arc<ModuleRegistry>,
        trust: TrustModel,
        config: RuntimeConfig,
    ) -> Self {
        let (governance, routing) = match &trust {
            TrustModel::ExternalAdmin => (Governance::Admin, empty_table(&config)),
            TrustModel::SelfAuthorizing => (Governance::SelfAuthorizing, empty_table(&config)),
            TrustModel::Beacon(beacon) => (
                Governance::Beacon,
                Routing::Beacon {
                    beacon: Arc::clone(beacon),
                    view: beacon.view(),
                },
            ),
        };
        let address = DispatcherAddress::new();
        info!(dispatcher = %address, ?trust, "dispatcher created");
        Self {
            env: Env {
                registry,
                config,
                address,
                governance,
            },
            trust: Some(trust),
            instance: Mutex::new(Instance::new(routing, Lifecycle::Uninitialized)),
        }
    }

    /// Instance permanently bound to `module`
    pub(crate) fn fixed(
        registry: Arc<ModuleRegistry>,
        module: ModuleId,
        config: RuntimeConfig,
        lifecycle: Lifecycle,
    ) -> Self {
        let address = DispatcherAddress::new();
        Self {
            env: Env {
                registry,
                config,
                address,
                governance: Governance::Immutable,
            },
            trust: None,
            instance: Mutex::new(Instance::new(Routing::Fixed(module), lifecycle)),
        }
    }

    /// Bind the initial module and run its initializer as `admin`
    ///
    /// Atomic: if the initializer fails the dispatcher stays uninitialized
    /// with storage untouched.
    ///
    /// # Errors
    /// - [`DispatchError::AlreadyInitialized`] on a second call
    /// - [`DispatchError::UnknownModule`] if `module` is not deployed
    /// - [`DispatchError::BeaconMismatch`] if a beacon dispatcher is
    ///   initialized with a module other than the beacon's
    /// - [`DispatchError::ForwardedFailure`] if the initializer fails
    pub fn initialize(
        &self,
        module: ModuleId,
        admin: Identity,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        self.run(|frame| frame.initialize(module, admin, payload))?;
        info!(dispatcher = %self.env.address, %module, %admin, "dispatcher initialized");
        Ok(())
    }

    /// Invoke a selector as `caller`
    ///
    /// Reserved selectors carry an encoded [`AdminCall`] and are handled by
    /// the upgrade controller; their result is empty.
    ///
    /// # Errors
    /// Any [`DispatchError`]; every effect of the call has been undone.
    pub fn invoke(
        &self,
        selector: Selector,
        payload: &[u8],
        caller: Identity,
    ) -> Result<Vec<u8>, DispatchError> {
        self.run(|frame| frame.dispatch(selector, payload, caller))
    }

    fn run<T>(
        &self,
        body: impl FnOnce(&mut Frame<'_>) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let mut guard = self.instance.lock();
        let instance = &mut *guard;
        instance.control.routing.refresh();

        let mut budget = Budget::new(self.env.config.budget);
        let snapshot = instance.snapshot();
        let result = body(&mut Frame::new(&self.env, instance, &mut budget));

        match result {
            Ok(value) => {
                instance.commit();
                Ok(value)
            }
            Err(err) => {
                instance.restore(snapshot);
                instance.commit();
                warn!(dispatcher = %self.env.address, error = %err, "call rejected");
                Err(err)
            }
        }
    }

    fn govern(&self, caller: Identity, call: &AdminCall) -> Result<(), DispatchError> {
        let payload = call.encode()?;
        self.invoke(call.selector(), &payload, caller).map(drop)
    }

    /// Replace the default target
    ///
    /// # Errors
    /// [`DispatchError::Unauthorized`], [`DispatchError::LayoutIncompatible`],
    /// [`DispatchError::ImmutableRoute`] on clones, or any other governance
    /// failure.
    pub fn upgrade(
        &self,
        caller: Identity,
        module: ModuleId,
        auth: Option<&[u8]>,
    ) -> Result<(), DispatchError> {
        self.govern(caller, &AdminCall::upgrade(module, auth))
    }

    /// Apply a routing batch atomically (multi-entry only)
    ///
    /// # Errors
    /// [`DispatchError::RoutingModeMismatch`] in single-pointer mode,
    /// [`DispatchError::DuplicateRouteClaim`], [`DispatchError::RouteNotFound`],
    /// [`DispatchError::LayoutIncompatible`] and the authorization errors.
    pub fn cut(
        &self,
        caller: Identity,
        batch: RouteBatch,
        auth: Option<&[u8]>,
    ) -> Result<(), DispatchError> {
        self.govern(caller, &AdminCall::cut(batch, auth))
    }

    /// Route one selector
    ///
    /// # Errors
    /// As [`Dispatcher::cut`].
    pub fn add_route(
        &self,
        caller: Identity,
        selector: Selector,
        module: ModuleId,
        auth: Option<&[u8]>,
    ) -> Result<(), DispatchError> {
        self.cut(caller, RouteBatch::new().add(selector, module), auth)
    }

    /// Tombstone one selector
    ///
    /// # Errors
    /// As [`Dispatcher::cut`].
    pub fn remove_route(
        &self,
        caller: Identity,
        selector: Selector,
        auth: Option<&[u8]>,
    ) -> Result<(), DispatchError> {
        self.cut(caller, RouteBatch::new().remove(selector), auth)
    }

    /// Give up upgrade authority permanently
    ///
    /// # Errors
    /// [`DispatchError::Unauthorized`] unless authorized.
    pub fn renounce_admin(&self, caller: Identity, auth: Option<&[u8]>) -> Result<(), DispatchError> {
        self.govern(caller, &AdminCall::renounce_admin(auth))
    }

    /// Hand admin authority to `to`
    ///
    /// # Errors
    /// [`DispatchError::Unauthorized`] unless authorized.
    pub fn transfer_admin(
        &self,
        caller: Identity,
        to: Identity,
        auth: Option<&[u8]>,
    ) -> Result<(), DispatchError> {
        self.govern(caller, &AdminCall::transfer_admin(to, auth))
    }

    /// Stop the dispatcher permanently
    ///
    /// # Errors
    /// [`DispatchError::Unauthorized`] unless authorized.
    pub fn freeze(&self, caller: Identity, auth: Option<&[u8]>) -> Result<(), DispatchError> {
        self.govern(caller, &AdminCall::freeze(auth))
    }

    /// Module a selector resolves to right now
    ///
    /// Pure: beacon dispatchers report the target they last observed, which
    /// is refreshed only by the next top-level call. `None` until
    /// initialized, matching what [`Dispatcher::invoke`] would do.
    #[must_use]
    pub fn current_module(&self, selector: Selector) -> Option<ModuleId> {
        let instance = self.instance.lock();
        if instance.control.lifecycle == Lifecycle::Uninitialized {
            return None;
        }
        instance.control.routing.resolve(selector)
    }

    /// Dispatcher address
    #[inline]
    #[must_use]
    pub fn address(&self) -> DispatcherAddress {
        self.env.address
    }

    /// Trust model chosen at construction; `None` for clones
    #[must_use]
    pub fn trust_model(&self) -> Option<&TrustModel> {
        self.trust.as_ref()
    }

    /// Check if this is an immutable clone
    #[must_use]
    pub fn is_clone(&self) -> bool {
        self.env.governance == Governance::Immutable
    }

    /// Lifecycle state
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.instance.lock().control.lifecycle
    }

    /// Current admin
    #[must_use]
    pub fn admin(&self) -> Option<Identity> {
        self.instance.lock().control.admin
    }

    /// Routing mode
    #[must_use]
    pub fn routing_mode(&self) -> RoutingMode {
        self.instance.lock().control.routing.mode()
    }

    /// Copy of the current routing table; `None` for beacon and clone instances
    #[must_use]
    pub fn routing_table(&self) -> Option<RoutingTable> {
        match &self.instance.lock().control.routing {
            Routing::Table(table) => Some(RoutingTable::clone(table)),
            Routing::Beacon { .. } | Routing::Fixed(_) => None,
        }
    }

    /// Beacon this dispatcher follows
    #[must_use]
    pub fn beacon(&self) -> Option<Arc<Beacon>> {
        match &self.trust {
            Some(TrustModel::Beacon(beacon)) => Some(Arc::clone(beacon)),
            _ => None,
        }
    }

    /// Copy of the upgrade log
    #[must_use]
    pub fn upgrade_log(&self) -> UpgradeLog {
        self.instance.lock().log.clone()
    }

    /// Read one storage slot
    #[must_use]
    pub fn load(&self, slot: u64) -> Word {
        self.instance.lock().storage.load(slot)
    }

    /// Copy of every non-zero slot
    #[must_use]
    pub fn storage_snapshot(&self) -> BTreeMap<u64, Word> {
        self.instance.lock().storage.snapshot()
    }

    /// Registry this dispatcher resolves modules in
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.env.registry
    }
}

fn empty_table(config: &RuntimeConfig) -> Routing {
    Routing::Table(Arc::new(RoutingTable::new(config.default_routing_mode, None)))
}
