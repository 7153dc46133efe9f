//! Invocation frames
//!
//! A [`Frame`] is one level of an invocation: top-level calls get a fresh
//! frame, reentrant calls a nested frame over the same instance and budget.
//! Nothing is locked below the top level; the instance is reborrowed.
//!
//! Dispatch order:
//! 1. depth check and base charge
//! 2. reserved selectors divert to governance
//! 3. lifecycle check (reentrant calls are admitted while upgrading)
//! 4. transparent-admin rule
//! 5. resolution and forwarded execution

use crate::admin::AdminCall;
use crate::budget::Budget;
use crate::config::RuntimeConfig;
use crate::error::DispatchError;
use crate::instance::{Governance, Instance, Routing};
use crate::lifecycle::Lifecycle;
use hotswap_layout::{LayoutError, LayoutValidator, StorageLayout};
use hotswap_module::{
    CallContext, DispatcherAddress, Host, Identity, Module, ModuleCode, ModuleFault, ModuleId,
    ModuleRegistry, Selector, UpgradeProposal, Word,
};
use hotswap_routing::{Rebinding, RoutingMode, RoutingTable};
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed per-dispatcher environment
#[derive(Debug)]
pub(crate) struct Env {
    pub(crate) registry: Arc<ModuleRegistry>,
    pub(crate) config: RuntimeConfig,
    pub(crate) address: DispatcherAddress,
    pub(crate) governance: Governance,
}

pub(crate) struct Frame<'a> {
    env: &'a Env,
    instance: &'a mut Instance,
    budget: &'a mut Budget,
    depth: usize,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(env: &'a Env, instance: &'a mut Instance, budget: &'a mut Budget) -> Self {
        Self {
            env,
            instance,
            budget,
            depth: 0,
        }
    }

    fn nested(&mut self) -> Frame<'_> {
        Frame {
            env: self.env,
            instance: &mut *self.instance,
            budget: &mut *self.budget,
            depth: self.depth + 1,
        }
    }

    pub(crate) fn dispatch(
        &mut self,
        selector: Selector,
        payload: &[u8],
        caller: Identity,
    ) -> Result<Vec<u8>, DispatchError> {
        if self.depth > self.env.config.max_call_depth {
            return Err(self.budget.exhaust().into());
        }
        self.budget.charge_invoke()?;

        if selector.is_reserved() {
            self.govern(selector, payload, caller)?;
            return Ok(Vec::new());
        }

        self.ensure_callable()?;
        if self.env.governance == Governance::Admin && self.instance.control.admin == Some(caller) {
            return Err(DispatchError::Unauthorized);
        }

        let target = self
            .instance
            .control
            .routing
            .resolve(selector)
            .ok_or(DispatchError::RouteNotFound { selector })?;
        let module = self.module(target)?;
        debug!(
            dispatcher = %self.env.address,
            %selector,
            module = %target,
            depth = self.depth,
            "forwarding call"
        );
        self.execute(&module, caller, payload, |code, cx| code.call(selector, cx))
    }

    /// Bind the first module, set the admin and run the module's initializer
    pub(crate) fn initialize(
        &mut self,
        module_id: ModuleId,
        admin: Identity,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        if self.instance.control.lifecycle != Lifecycle::Uninitialized {
            return Err(DispatchError::AlreadyInitialized);
        }
        let module = self.module(module_id)?;

        match &mut self.instance.control.routing {
            Routing::Table(table) => {
                *table = Arc::new(table.with_default(module_id).0);
            }
            Routing::Beacon { view, .. } => {
                if view.module != module_id {
                    return Err(DispatchError::BeaconMismatch {
                        requested: module_id,
                        current: view.module,
                    });
                }
            }
            Routing::Fixed(fixed) => {
                if *fixed != module_id {
                    return Err(DispatchError::ImmutableRoute);
                }
            }
        }
        if self.env.governance != Governance::Immutable {
            self.instance.control.admin = Some(admin);
        }
        self.instance.control.transition(Lifecycle::Active)?;

        self.budget.charge_invoke()?;
        self.execute(&module, admin, payload, |code, cx| code.initialize(cx))
    }

    fn ensure_callable(&self) -> Result<(), DispatchError> {
        match self.instance.control.lifecycle {
            Lifecycle::Active => Ok(()),
            Lifecycle::Upgrading if self.depth > 0 => Ok(()),
            Lifecycle::Upgrading => Err(DispatchError::ReentrantUpgradeConflict),
            Lifecycle::Uninitialized => Err(DispatchError::NotInitialized),
            Lifecycle::Frozen => Err(DispatchError::Frozen),
        }
    }

    fn module(&self, id: ModuleId) -> Result<Arc<Module>, DispatchError> {
        self.env
            .registry
            .get(id)
            .ok_or(DispatchError::UnknownModule { module: id })
    }

    /// Run a module entry point against this dispatcher's storage
    fn execute<T>(
        &mut self,
        module: &Module,
        caller: Identity,
        payload: &[u8],
        entry: impl FnOnce(&dyn ModuleCode, &mut CallContext<'_>) -> Result<T, ModuleFault>,
    ) -> Result<T, DispatchError> {
        let result = {
            let mut host = ForwardHost {
                frame: self,
                lease: module.layout(),
            };
            let mut cx = CallContext::new(caller, payload, &mut host);
            entry(module.code(), &mut cx)
        };

        // A module may swallow a failed charge; the budget still decides
        if self.budget.is_exhausted() {
            return Err(self.budget.state().into());
        }
        result.map_err(DispatchError::ForwardedFailure)
    }

    fn govern(
        &mut self,
        selector: Selector,
        payload: &[u8],
        caller: Identity,
    ) -> Result<(), DispatchError> {
        if self.env.governance == Governance::Immutable {
            return Err(DispatchError::ImmutableRoute);
        }
        self.budget.charge_governance()?;

        match self.instance.control.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Upgrading => return Err(DispatchError::ReentrantUpgradeConflict),
            Lifecycle::Uninitialized => return Err(DispatchError::NotInitialized),
            Lifecycle::Frozen => return Err(DispatchError::Frozen),
        }

        let call = AdminCall::decode(selector, payload)?;
        if self.env.governance == Governance::Beacon && call.mutates_routing() {
            return Err(DispatchError::Unauthorized);
        }

        self.instance.control.transition(Lifecycle::Upgrading)?;
        self.authorize(&call, caller)?;

        match call {
            AdminCall::Upgrade { module, .. } => {
                self.upgrade_default(module, caller)?;
                self.instance.control.transition(Lifecycle::Active)
            }
            AdminCall::Cut { batch, .. } => {
                let (next, rebindings) = self.table()?.apply(&batch)?;
                self.commit_routing(next, rebindings, caller)?;
                self.instance.control.transition(Lifecycle::Active)
            }
            AdminCall::RenounceAdmin { .. } => {
                self.instance.control.admin = None;
                self.instance.control.renounced = true;
                info!(dispatcher = %self.env.address, %caller, "admin renounced");
                self.instance.control.transition(Lifecycle::Active)
            }
            AdminCall::TransferAdmin { to, .. } => {
                self.instance.control.admin = Some(to);
                info!(dispatcher = %self.env.address, new_admin = %to, "admin transferred");
                self.instance.control.transition(Lifecycle::Active)
            }
            AdminCall::Freeze { .. } => {
                info!(dispatcher = %self.env.address, %caller, "dispatcher frozen");
                self.instance.control.transition(Lifecycle::Frozen)
            }
        }
    }

    fn authorize(&mut self, call: &AdminCall, caller: Identity) -> Result<(), DispatchError> {
        match self.env.governance {
            Governance::Admin | Governance::Beacon => {
                if self.instance.control.admin == Some(caller) {
                    Ok(())
                } else {
                    Err(DispatchError::Unauthorized)
                }
            }
            Governance::Immutable => Err(DispatchError::ImmutableRoute),
            Governance::SelfAuthorizing => {
                if self.instance.control.renounced {
                    return Err(DispatchError::Unauthorized);
                }
                let current = self.instance.control.routing.default_target();
                let Some(authority) = current else {
                    return Err(DispatchError::Unauthorized);
                };
                let module = self.module(authority)?;
                let proposal = UpgradeProposal {
                    dispatcher: self.env.address,
                    current,
                    action: call.proposed_action(),
                };

                let snapshot = self.instance.snapshot();
                match self.execute(&module, caller, call.auth(), |code, cx| {
                    code.authorize_upgrade(cx, &proposal)
                }) {
                    Ok(()) => Ok(()),
                    Err(err @ DispatchError::ResourceExhausted { .. }) => Err(err),
                    Err(err) => {
                        self.instance.restore(snapshot);
                        debug!(
                            dispatcher = %self.env.address,
                            kind = call.kind(),
                            reason = %err,
                            "governing module refused proposal"
                        );
                        Err(DispatchError::Unauthorized)
                    }
                }
            }
        }
    }

    fn table(&self) -> Result<Arc<RoutingTable>, DispatchError> {
        match &self.instance.control.routing {
            Routing::Table(table) => Ok(Arc::clone(table)),
            Routing::Beacon { .. } => Err(DispatchError::Unauthorized),
            Routing::Fixed(_) => Err(DispatchError::ImmutableRoute),
        }
    }

    fn upgrade_default(&mut self, module: ModuleId, caller: Identity) -> Result<(), DispatchError> {
        let (next, rebinding) = self.table()?.with_default(module);
        if rebinding.is_none() {
            // Same target: still reject an unknown module rather than report success
            self.module(module)?;
        }
        self.commit_routing(next, rebinding.into_iter().collect(), caller)
    }

    /// Validate a candidate table and publish it with one pointer swap
    fn commit_routing(
        &mut self,
        next: RoutingTable,
        rebindings: Vec<Rebinding>,
        caller: Identity,
    ) -> Result<(), DispatchError> {
        for rebinding in &rebindings {
            let Some(new_id) = rebinding.new else {
                continue;
            };
            let new = self.module(new_id)?;
            if let Some(old_id) = rebinding.old {
                let old = self.module(old_id)?;
                LayoutValidator::check_compatible(old.layout(), new.layout())
                    .map_err(LayoutError::from)?;
            }
        }

        let routed = next
            .routed_modules()
            .into_iter()
            .map(|id| self.module(id))
            .collect::<Result<Vec<_>, _>>()?;
        if next.mode() == RoutingMode::MultiEntry {
            let claims: Vec<(ModuleId, &StorageLayout)> =
                routed.iter().map(|m| (m.id(), m.layout())).collect();
            LayoutValidator::check_disjoint(&claims)?;
        }
        // Storage under a dropped module's regions survives it
        for module in &routed {
            LayoutValidator::check_retired(
                self.instance.control.retired.values(),
                module.layout(),
            )
            .map_err(LayoutError::from)?;
        }

        let previous = self.table()?.routed_modules();
        for id in previous.iter().filter(|id| routed.iter().all(|m| m.id() != **id)) {
            let module = self.module(*id)?;
            for region in module.layout().regions() {
                self.instance
                    .control
                    .retired
                    .insert(region.offset, region.clone());
            }
        }

        self.instance.control.routing = Routing::Table(Arc::new(next));
        for rebinding in rebindings {
            let record = self.instance.log.append(
                rebinding.selector,
                rebinding.old,
                rebinding.new,
                caller,
            );
            info!(
                dispatcher = %self.env.address,
                selector = ?rebinding.selector,
                from = ?rebinding.old,
                to = ?rebinding.new,
                record = %record.short_hash(),
                "route committed"
            );
        }
        Ok(())
    }
}

/// Host handed to module code: lease-checked storage, budget, reentry
struct ForwardHost<'f, 'a> {
    frame: &'f mut Frame<'a>,
    lease: &'f StorageLayout,
}

impl Host for ForwardHost<'_, '_> {
    fn dispatcher(&self) -> DispatcherAddress {
        self.frame.env.address
    }

    fn lease(&self) -> &StorageLayout {
        self.lease
    }

    fn load(&mut self, slot: u64) -> Result<Word, ModuleFault> {
        self.frame.budget.charge_load()?;
        if !self.lease.covers(slot) {
            return Err(ModuleFault::LeaseViolation { slot });
        }
        Ok(self.frame.instance.storage.load(slot))
    }

    fn store(&mut self, slot: u64, value: Word) -> Result<(), ModuleFault> {
        self.frame.budget.charge_store()?;
        if !self.lease.covers(slot) {
            return Err(ModuleFault::LeaseViolation { slot });
        }
        self.frame.instance.storage.store(slot, value);
        Ok(())
    }

    fn charge(&mut self, units: u64) -> Result<(), ModuleFault> {
        self.frame.budget.charge(units)?;
        Ok(())
    }

    fn reenter(&mut self, selector: Selector, payload: &[u8]) -> Result<Vec<u8>, ModuleFault> {
        let snapshot = self.frame.instance.snapshot();
        let caller = self.frame.env.address.identity();
        let result = self.frame.nested().dispatch(selector, payload, caller);
        result.map_err(|err| {
            self.frame.instance.restore(snapshot);
            ModuleFault::from(err)
        })
    }
}
