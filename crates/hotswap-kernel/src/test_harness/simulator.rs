//! Randomized invariant simulator
//!
//! Drives a small world (single-pointer and multi-entry dispatchers, a
//! beacon with followers, and a clone) through a seeded random sequence of
//! valid and invalid operations. A simple model predicts each outcome; after
//! every step the global invariants are re-checked.

use super::fixtures::{self, Deployed, BURN, INCREMENT, READ};
use crate::{AdminCall, Beacon, CloneFactory, DispatchError, Dispatcher, RuntimeConfig, TrustModel};
use hotswap_layout::LayoutValidator;
use hotswap_module::{DispatcherAddress, Identity, ModuleId, ModuleRegistry, Selector, Word};
use hotswap_routing::{RouteBatch, RoutingMode};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

/// Facet selectors are drawn from this range
const FACET_SELECTORS: std::ops::Range<u32> = 10..14;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Total operations to execute
    pub total_operations: u64,
    /// Dispatchers following the shared beacon
    pub beacon_followers: usize,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            total_operations: 1_000,
            beacon_followers: 3,
            stop_on_first_violation: true,
        }
    }
}

/// Operations the simulator can generate
#[derive(Debug, Clone, Copy, Serialize)]
pub enum SimulatedOperation {
    /// Increment the single-pointer counter as a user
    Increment,
    /// Invoke a module selector as the admin (transparent-admin rule)
    AdminInvoke,
    /// Upgrade the single-pointer dispatcher to counter version `target`
    Upgrade {
        /// Counter index (0 = v1, 1 = v2, 2 = v3)
        target: usize,
        /// Whether the admin issues it
        authorized: bool,
    },
    /// Route a facet selector on the multi-entry dispatcher
    AddFacet {
        /// Selector
        selector: u32,
        /// Facet index
        facet: usize,
    },
    /// Remove a facet selector
    RemoveFacet {
        /// Selector
        selector: u32,
    },
    /// Batch claiming one selector twice
    DuplicateClaim {
        /// Selector
        selector: u32,
    },
    /// Invoke a facet selector on the multi-entry dispatcher
    FacetInvoke {
        /// Selector
        selector: u32,
    },
    /// Upgrade the shared beacon
    BeaconUpgrade {
        /// Counter index
        target: usize,
        /// Whether the beacon admin issues it
        authorized: bool,
    },
    /// Invoke a beacon follower
    FollowerInvoke {
        /// Follower index
        index: usize,
    },
    /// Attempt to mutate the clone
    CloneMutation {
        /// Which governance path to try
        kind: u8,
    },
    /// Run until the budget is gone
    BurnBudget,
}

impl SimulatedOperation {
    /// Short name used in statistics
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::AdminInvoke => "admin_invoke",
            Self::Upgrade { .. } => "upgrade",
            Self::AddFacet { .. } => "add_facet",
            Self::RemoveFacet { .. } => "remove_facet",
            Self::DuplicateClaim { .. } => "duplicate_claim",
            Self::FacetInvoke { .. } => "facet_invoke",
            Self::BeaconUpgrade { .. } => "beacon_upgrade",
            Self::FollowerInvoke { .. } => "follower_invoke",
            Self::CloneMutation { .. } => "clone_mutation",
            Self::BurnBudget => "burn_budget",
        }
    }
}

/// Invariants checked after every step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvariantCheck {
    /// Every upgrade log verifies
    HashChainIsUnbroken,
    /// Resolving the same selector twice agrees
    ResolutionIsIdempotent,
    /// Failed calls leave storage, routing and logs untouched
    RejectedCallsLeaveNoTrace,
    /// Counter storage survives upgrades
    CounterIsPreserved,
    /// Each committed upgrade only appended layout regions
    LayoutsOnlyGrow,
    /// Followers see beacon upgrades only on their next call
    BeaconViewsAreLazy,
}

/// A specific invariant violation
#[derive(Debug, Clone, Serialize)]
pub struct InvariantViolation {
    /// Step at which it was detected
    pub operation_index: u64,
    /// Invariant violated
    pub check: InvariantCheck,
    /// What was observed
    pub details: String,
}

/// A violation detected during simulation
#[derive(Debug, Clone, Serialize)]
pub enum Violation {
    /// Outcome differed from the model's prediction
    UnexpectedOutcome {
        /// Step index
        operation_index: u64,
        /// Operation executed
        operation: SimulatedOperation,
        /// Predicted outcome
        expected: String,
        /// Observed outcome
        actual: String,
    },
    /// An invariant failed
    Invariant(InvariantViolation),
}

/// Statistics collected during simulation
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    /// Operations executed
    pub total_operations: u64,
    /// Operations that succeeded
    pub successful_operations: u64,
    /// Operations that failed (as predicted or not)
    pub failed_operations: u64,
    /// Count per operation kind
    pub operations_by_type: BTreeMap<String, u64>,
}

impl OperationStats {
    fn record(&mut self, operation: &SimulatedOperation, succeeded: bool) {
        self.total_operations += 1;
        *self
            .operations_by_type
            .entry(operation.name().to_string())
            .or_insert(0) += 1;
        if succeeded {
            self.successful_operations += 1;
        } else {
            self.failed_operations += 1;
        }
    }
}

/// Final report from the simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: OperationStats,
    /// Everything that went wrong
    pub violations: Vec<Violation>,
    /// Final counter value of the single-pointer dispatcher
    pub final_counter: u64,
    /// Final beacon epoch
    pub final_beacon_epoch: u64,
}

impl SimulatorReport {
    /// Check if no violation was found
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== Hotswap Simulator Report ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Total Operations: {}", self.stats.total_operations);
        let _ = writeln!(report, "Successful: {}", self.stats.successful_operations);
        let _ = writeln!(report, "Failed: {}", self.stats.failed_operations);
        let _ = writeln!(report, "Final Counter: {}", self.final_counter);
        let _ = writeln!(report, "Beacon Epoch: {}\n", self.final_beacon_epoch);

        let _ = writeln!(report, "Operations by type:");
        for (name, count) in &self.stats.operations_by_type {
            let _ = writeln!(report, "  {name}: {count}");
        }

        let _ = writeln!(report, "\nViolations: {}", self.violations.len());
        for violation in &self.violations {
            let _ = writeln!(report, "  {violation:?}");
        }
        let _ = writeln!(
            report,
            "\nResult: {}",
            if self.passed() { "PASSED" } else { "FAILED" }
        );
        report
    }
}

/// Predicted outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Success,
    Unauthorized,
    LayoutIncompatible,
    DuplicateRouteClaim,
    RouteNotFound,
    ForwardedFailure,
    ImmutableRoute,
    ResourceExhausted,
}

impl Expected {
    fn matches(self, actual: &Result<(), DispatchError>) -> bool {
        match actual {
            Ok(()) => self == Self::Success,
            Err(err) => matches!(
                (self, err),
                (Self::Unauthorized, DispatchError::Unauthorized)
                    | (Self::LayoutIncompatible, DispatchError::LayoutIncompatible(_))
                    | (Self::DuplicateRouteClaim, DispatchError::DuplicateRouteClaim { .. })
                    | (Self::RouteNotFound, DispatchError::RouteNotFound { .. })
                    | (Self::ForwardedFailure, DispatchError::ForwardedFailure(_))
                    | (Self::ImmutableRoute, DispatchError::ImmutableRoute)
                    | (Self::ResourceExhausted, DispatchError::ResourceExhausted { .. })
            ),
        }
    }
}

/// Observable state compared before and after failed steps
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    dispatchers: Vec<(BTreeMap<u64, Word>, usize, Vec<Option<ModuleId>>)>,
    beacon: (ModuleId, u64, usize),
}

struct World {
    registry: Arc<ModuleRegistry>,
    deployed: Deployed,
    admin: Identity,
    user: Identity,
    single: Dispatcher,
    multi: Dispatcher,
    beacon: Arc<Beacon>,
    followers: Vec<Dispatcher>,
    clones: CloneFactory,
    clone: DispatcherAddress,
    // Model
    counter: u64,
    facets: BTreeMap<u32, ModuleId>,
    tombstones: BTreeSet<u32>,
    ever_routed: BTreeSet<ModuleId>,
}

impl World {
    fn new(config: &SimulatorConfig) -> Result<Self, DispatchError> {
        let registry = Arc::new(ModuleRegistry::new());
        let deployed = fixtures::deploy_all(&registry)?;
        let v1 = deployed.counters[0];
        let admin = Identity::new();

        let single = Dispatcher::new(Arc::clone(&registry), TrustModel::ExternalAdmin);
        single.initialize(v1, admin, &[])?;

        let multi = Dispatcher::with_config(
            Arc::clone(&registry),
            TrustModel::ExternalAdmin,
            RuntimeConfig::default().with_routing_mode(RoutingMode::MultiEntry),
        );
        multi.initialize(v1, admin, &[])?;

        let beacon = Arc::new(Beacon::new(Arc::clone(&registry), v1, admin)?);
        let followers = (0..config.beacon_followers)
            .map(|_| {
                let follower = Dispatcher::new(
                    Arc::clone(&registry),
                    TrustModel::Beacon(Arc::clone(&beacon)),
                );
                follower.initialize(v1, admin, &[]).map(|()| follower)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let clones = CloneFactory::new(Arc::clone(&registry));
        let clone = clones.create(v1)?;

        Ok(Self {
            registry,
            deployed,
            admin,
            user: Identity::new(),
            single,
            multi,
            beacon,
            followers,
            clones,
            clone,
            counter: 0,
            facets: BTreeMap::new(),
            tombstones: BTreeSet::new(),
            ever_routed: BTreeSet::new(),
        })
    }

    fn probe_selectors() -> impl Iterator<Item = Selector> {
        std::iter::once(Selector::NONE).chain(FACET_SELECTORS.map(Selector::from_u32))
    }

    fn fingerprint(&self) -> Fingerprint {
        let dispatchers = std::iter::once(&self.single)
            .chain(std::iter::once(&self.multi))
            .chain(self.followers.iter())
            .map(|d| {
                (
                    d.storage_snapshot(),
                    d.upgrade_log().len(),
                    Self::probe_selectors().map(|s| d.current_module(s)).collect(),
                )
            })
            .collect();
        Fingerprint {
            dispatchers,
            beacon: (
                self.beacon.current_module(),
                self.beacon.epoch(),
                self.beacon.upgrade_log().len(),
            ),
        }
    }

    fn layout_compatible(&self, from: ModuleId, to: ModuleId) -> bool {
        match (self.registry.get(from), self.registry.get(to)) {
            (Some(from), Some(to)) => LayoutValidator::is_compatible(from.layout(), to.layout()),
            _ => false,
        }
    }

    fn predict_upgrade(&self, current: ModuleId, target: ModuleId, authorized: bool) -> Expected {
        if !authorized {
            Expected::Unauthorized
        } else if current == target || self.layout_compatible(current, target) {
            Expected::Success
        } else {
            Expected::LayoutIncompatible
        }
    }

    fn predict_add(&self, selector: u32, facet: ModuleId) -> Expected {
        match self.facets.get(&selector) {
            Some(bound) if *bound == facet => Expected::Success,
            Some(_) => Expected::DuplicateRouteClaim,
            None => {
                let mut routed: BTreeSet<ModuleId> = self.facets.values().copied().collect();
                routed.insert(self.deployed.counters[0]);
                routed.insert(facet);
                let modules: Vec<_> = routed.iter().filter_map(|id| self.registry.get(*id)).collect();
                // Facets routed earlier left their regions behind
                let retired: Vec<_> =
                    self.ever_routed.iter().filter_map(|id| self.registry.get(*id)).collect();
                let reclaims_cleanly = self.registry.get(facet).is_some_and(|new| {
                    LayoutValidator::check_retired(
                        retired.iter().flat_map(|m| m.layout().regions()),
                        new.layout(),
                    )
                    .is_ok()
                });
                if LayoutValidator::no_overlap(modules.iter().map(|m| m.layout())) && reclaims_cleanly
                {
                    Expected::Success
                } else {
                    Expected::LayoutIncompatible
                }
            }
        }
    }

    fn read_counter(&self) -> Result<u64, DispatchError> {
        let out = self
            .single
            .invoke(Selector::from_u32(READ), &[], self.user)?;
        let mut raw = [0u8; 8];
        if out.len() == 8 {
            raw.copy_from_slice(&out);
        }
        Ok(u64::from_be_bytes(raw))
    }

    /// Execute one step, returning prediction and observation
    fn apply(&mut self, operation: SimulatedOperation) -> (Expected, Result<(), DispatchError>) {
        let sel = Selector::from_u32;
        match operation {
            SimulatedOperation::Increment => {
                let result = self.single.invoke(sel(INCREMENT), &[], self.user);
                if result.is_ok() {
                    self.counter += 1;
                }
                (Expected::Success, result.map(drop))
            }
            SimulatedOperation::AdminInvoke => {
                let result = self.single.invoke(sel(INCREMENT), &[], self.admin);
                (Expected::Unauthorized, result.map(drop))
            }
            SimulatedOperation::Upgrade { target, authorized } => {
                let target = self.deployed.counters[target];
                let current = self.single.current_module(Selector::NONE);
                let expected = current.map_or(Expected::Unauthorized, |c| {
                    self.predict_upgrade(c, target, authorized)
                });
                let caller = if authorized { self.admin } else { self.user };
                (expected, self.single.upgrade(caller, target, None))
            }
            SimulatedOperation::AddFacet { selector, facet } => {
                let facet = self.deployed.facets[facet];
                let expected = self.predict_add(selector, facet);
                let result = self.multi.add_route(self.admin, sel(selector), facet, None);
                if result.is_ok() {
                    self.facets.insert(selector, facet);
                    self.tombstones.remove(&selector);
                    self.ever_routed.insert(facet);
                }
                (expected, result)
            }
            SimulatedOperation::RemoveFacet { selector } => {
                let expected = if self.facets.contains_key(&selector) {
                    Expected::Success
                } else {
                    Expected::RouteNotFound
                };
                let result = self.multi.remove_route(self.admin, sel(selector), None);
                if result.is_ok() {
                    self.facets.remove(&selector);
                    self.tombstones.insert(selector);
                }
                (expected, result)
            }
            SimulatedOperation::DuplicateClaim { selector } => {
                let batch = RouteBatch::new()
                    .add(selector, self.deployed.facets[0])
                    .add(selector, self.deployed.facets[2]);
                (Expected::DuplicateRouteClaim, self.multi.cut(self.admin, batch, None))
            }
            SimulatedOperation::FacetInvoke { selector } => {
                let expected = if self.facets.contains_key(&selector) {
                    Expected::Success
                } else if self.tombstones.contains(&selector) {
                    Expected::RouteNotFound
                } else {
                    // Falls through to the counter, which has no such entry
                    Expected::ForwardedFailure
                };
                (expected, self.multi.invoke(sel(selector), &[], self.user).map(drop))
            }
            SimulatedOperation::BeaconUpgrade { target, authorized } => {
                let target = self.deployed.counters[target];
                let expected =
                    self.predict_upgrade(self.beacon.current_module(), target, authorized);
                let caller = if authorized { self.admin } else { self.user };
                (expected, self.beacon.upgrade(caller, target))
            }
            SimulatedOperation::FollowerInvoke { index } => {
                let result = self
                    .followers
                    .get(index)
                    .map_or(Ok(()), |f| f.invoke(sel(INCREMENT), &[], self.user).map(drop));
                (Expected::Success, result)
            }
            SimulatedOperation::CloneMutation { kind } => {
                let Some(clone) = self.clones.get(self.clone) else {
                    return (Expected::ImmutableRoute, Err(DispatchError::NotInitialized));
                };
                let v2 = self.deployed.counters[1];
                let result = match kind {
                    0 => clone.upgrade(self.admin, v2, None),
                    1 => clone.add_route(self.admin, sel(10), v2, None),
                    2 => clone.remove_route(self.admin, sel(10), None),
                    _ => {
                        let call = AdminCall::freeze(None);
                        call.encode()
                            .and_then(|payload| clone.invoke(call.selector(), &payload, self.admin))
                            .map(drop)
                    }
                };
                (Expected::ImmutableRoute, result)
            }
            SimulatedOperation::BurnBudget => (
                Expected::ResourceExhausted,
                self.single.invoke(sel(BURN), &[], self.user).map(drop),
            ),
        }
    }

    fn check_invariants(
        &self,
        index: u64,
        operation: SimulatedOperation,
        failed: bool,
        before: &Fingerprint,
        followers_before: &[Option<ModuleId>],
    ) -> Vec<InvariantViolation> {
        let mut found = Vec::new();
        let mut violation = |check, details: String| {
            found.push(InvariantViolation {
                operation_index: index,
                check,
                details,
            });
        };

        let logs = std::iter::once(self.single.upgrade_log())
            .chain(std::iter::once(self.multi.upgrade_log()))
            .chain(std::iter::once(self.beacon.upgrade_log()));
        for log in logs {
            if let Err(err) = log.verify_integrity() {
                violation(InvariantCheck::HashChainIsUnbroken, err.to_string());
            }
        }

        for selector in Self::probe_selectors() {
            if self.multi.current_module(selector) != self.multi.current_module(selector) {
                violation(
                    InvariantCheck::ResolutionIsIdempotent,
                    format!("selector {selector} resolved differently twice"),
                );
            }
        }

        if failed {
            let after = self.fingerprint();
            if &after != before {
                violation(
                    InvariantCheck::RejectedCallsLeaveNoTrace,
                    format!("{} failed but changed observable state", operation.name()),
                );
            }
        }

        match self.read_counter() {
            Ok(value) if value == self.counter => {}
            Ok(value) => violation(
                InvariantCheck::CounterIsPreserved,
                format!("counter reads {value}, model says {}", self.counter),
            ),
            Err(err) => violation(
                InvariantCheck::CounterIsPreserved,
                format!("counter unreadable: {err}"),
            ),
        }

        if let Some(last) = self.single.upgrade_log().last() {
            if let (Some(old), Some(new)) = (last.old_module, last.new_module) {
                if !self.layout_compatible(old, new) {
                    violation(
                        InvariantCheck::LayoutsOnlyGrow,
                        format!("record {} replaced {old} with incompatible {new}", last.sequence),
                    );
                }
            }
        }

        match operation {
            SimulatedOperation::BeaconUpgrade { .. } => {
                let now: Vec<_> = self
                    .followers
                    .iter()
                    .map(|f| f.current_module(Selector::NONE))
                    .collect();
                if now != followers_before {
                    violation(
                        InvariantCheck::BeaconViewsAreLazy,
                        "follower retargeted before its next call".to_string(),
                    );
                }
            }
            SimulatedOperation::FollowerInvoke { index } if !failed => {
                let observed = self.followers.get(index).and_then(|f| f.current_module(Selector::NONE));
                if observed.is_some_and(|m| m != self.beacon.current_module()) {
                    violation(
                        InvariantCheck::BeaconViewsAreLazy,
                        format!("follower {index} still on an old module after a call"),
                    );
                }
            }
            _ => {}
        }

        found
    }
}

fn facet_selector(rng: &mut StdRng) -> u32 {
    rng.gen_range(FACET_SELECTORS)
}

fn next_operation(rng: &mut StdRng, followers: usize) -> SimulatedOperation {
    match rng.gen_range(0..100) {
        0..=24 => SimulatedOperation::Increment,
        25..=29 => SimulatedOperation::AdminInvoke,
        30..=41 => SimulatedOperation::Upgrade {
            target: rng.gen_range(0..3),
            authorized: rng.gen_bool(0.8),
        },
        42..=53 => SimulatedOperation::AddFacet {
            selector: facet_selector(rng),
            facet: rng.gen_range(0..3),
        },
        54..=60 => SimulatedOperation::RemoveFacet {
            selector: facet_selector(rng),
        },
        61..=63 => SimulatedOperation::DuplicateClaim {
            selector: facet_selector(rng),
        },
        64..=70 => SimulatedOperation::FacetInvoke {
            selector: facet_selector(rng),
        },
        71..=78 => SimulatedOperation::BeaconUpgrade {
            target: rng.gen_range(0..3),
            authorized: rng.gen_bool(0.7),
        },
        79..=89 if followers > 0 => SimulatedOperation::FollowerInvoke {
            index: rng.gen_range(0..followers),
        },
        79..=89 => SimulatedOperation::Increment,
        90..=95 => SimulatedOperation::CloneMutation {
            kind: rng.gen_range(0..4),
        },
        _ => SimulatedOperation::BurnBudget,
    }
}

/// Run the simulator
///
/// # Errors
/// Only if the simulated world cannot be set up.
pub fn run_simulator(config: SimulatorConfig) -> Result<SimulatorReport, DispatchError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut world = World::new(&config)?;
    let mut stats = OperationStats::default();
    let mut violations = Vec::new();

    tracing::info!(seed = config.seed, operations = config.total_operations, "simulation started");

    for index in 0..config.total_operations {
        let operation = next_operation(&mut rng, world.followers.len());
        let before = world.fingerprint();
        let followers_before: Vec<_> = world
            .followers
            .iter()
            .map(|f| f.current_module(Selector::NONE))
            .collect();

        let (expected, actual) = world.apply(operation);
        stats.record(&operation, actual.is_ok());

        if !expected.matches(&actual) {
            violations.push(Violation::UnexpectedOutcome {
                operation_index: index,
                operation,
                expected: format!("{expected:?}"),
                actual: match &actual {
                    Ok(()) => "success".to_string(),
                    Err(err) => format!("{err:?}"),
                },
            });
        }
        violations.extend(
            world
                .check_invariants(index, operation, actual.is_err(), &before, &followers_before)
                .into_iter()
                .map(Violation::Invariant),
        );

        if config.stop_on_first_violation && !violations.is_empty() {
            break;
        }
    }

    tracing::info!(
        operations = stats.total_operations,
        violations = violations.len(),
        "simulation finished"
    );

    Ok(SimulatorReport {
        final_counter: world.counter,
        final_beacon_epoch: world.beacon.epoch(),
        config,
        stats,
        violations,
    })
}
