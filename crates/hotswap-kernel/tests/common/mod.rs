//! Shared setup for kernel integration tests

#![allow(dead_code)]

use hotswap_kernel::prelude::*;
use hotswap_test_utils::{decode_u64, sel, Fixture, GET_X};
use std::sync::Arc;

pub struct Setup {
    pub fx: Fixture,
    pub admin: Identity,
    pub user: Identity,
}

impl Setup {
    pub fn new() -> Self {
        Self {
            fx: Fixture::new(),
            admin: Identity::new(),
            user: Identity::new(),
        }
    }

    pub fn registry(&self) -> Arc<ModuleRegistry> {
        Arc::clone(&self.fx.registry)
    }

    /// Initialized external-admin dispatcher
    pub fn admin_dispatcher(&self, module: ModuleId) -> Dispatcher {
        let dispatcher = Dispatcher::new(self.registry(), TrustModel::ExternalAdmin);
        dispatcher.initialize(module, self.admin, &[]).unwrap();
        dispatcher
    }

    /// Initialized multi-entry external-admin dispatcher
    pub fn multi_dispatcher(&self, default: ModuleId) -> Dispatcher {
        let dispatcher = Dispatcher::with_config(
            self.registry(),
            TrustModel::ExternalAdmin,
            RuntimeConfig::default().with_routing_mode(RoutingMode::MultiEntry),
        );
        dispatcher.initialize(default, self.admin, &[]).unwrap();
        dispatcher
    }

    /// Initialized self-authorizing dispatcher; the initializer runs as `admin`
    pub fn self_authorizing(&self, module: ModuleId) -> Dispatcher {
        let dispatcher = Dispatcher::new(self.registry(), TrustModel::SelfAuthorizing);
        dispatcher.initialize(module, self.admin, &[]).unwrap();
        dispatcher
    }

    pub fn read_x(&self, dispatcher: &Dispatcher) -> u64 {
        decode_u64(&dispatcher.invoke(sel(GET_X), &[], self.user).unwrap())
    }
}

/// Everything a failed call must leave untouched
#[derive(Debug, PartialEq)]
pub struct State {
    pub storage: std::collections::BTreeMap<u64, Word>,
    pub default: Option<ModuleId>,
    pub table: Option<RoutingTable>,
    pub log: UpgradeLog,
    pub lifecycle: Lifecycle,
    pub admin: Option<Identity>,
}

pub fn state(dispatcher: &Dispatcher) -> State {
    State {
        storage: dispatcher.storage_snapshot(),
        default: dispatcher.current_module(Selector::NONE),
        table: dispatcher.routing_table(),
        log: dispatcher.upgrade_log(),
        lifecycle: dispatcher.lifecycle(),
        admin: dispatcher.admin(),
    }
}
