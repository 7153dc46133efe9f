//! Kernel error types
//!
//! [`DispatchError`] is the single error surface of every dispatcher,
//! beacon and clone operation. Sub-crate errors convert into it with `From`.

use crate::lifecycle::Lifecycle;
use hotswap_layout::LayoutError;
use hotswap_module::{ModuleFault, ModuleId, Selector};
use hotswap_routing::{RoutingError, RoutingMode};

/// What a failed operation left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Refused before anything ran
    Rejected,
    /// Something ran and every effect was undone
    RolledBack,
}

/// Dispatcher errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No module resolves for the selector (or it was tombstoned)
    #[error("no route for selector {selector}")]
    RouteNotFound {
        /// Selector invoked
        selector: Selector,
    },

    /// Caller may not perform this operation
    #[error("unauthorized")]
    Unauthorized,

    /// Layout validator refused the change
    #[error("layout incompatible: {0}")]
    LayoutIncompatible(#[from] LayoutError),

    /// Two claims on one selector disagree
    #[error("selector {selector} claimed by both {first:?} and {second:?}")]
    DuplicateRouteClaim {
        /// Contested selector
        selector: Selector,
        /// Earlier claim
        first: Option<ModuleId>,
        /// Conflicting claim
        second: Option<ModuleId>,
    },

    /// Governance attempted while an upgrade is in progress
    #[error("upgrade already in progress")]
    ReentrantUpgradeConflict,

    /// Invocation budget spent; everything was rolled back
    #[error("resource budget exhausted ({used}/{limit} units)")]
    ResourceExhausted {
        /// Units consumed when the budget ran out
        used: u64,
        /// Budget limit
        limit: u64,
    },

    /// Module code failed
    #[error("forwarded call failed: {0}")]
    ForwardedFailure(#[source] ModuleFault),

    /// Clone instances never change their target
    #[error("route is immutable")]
    ImmutableRoute,

    /// `initialize` called twice
    #[error("dispatcher already initialized")]
    AlreadyInitialized,

    /// Invocation before `initialize`
    #[error("dispatcher not initialized")]
    NotInitialized,

    /// Instance was frozen by governance
    #[error("dispatcher is frozen")]
    Frozen,

    /// Module is not deployed in the registry
    #[error("unknown module {module}")]
    UnknownModule {
        /// Requested module
        module: ModuleId,
    },

    /// Initial module differs from the beacon's current module
    #[error("module {requested} does not match beacon module {current}")]
    BeaconMismatch {
        /// Module passed to `initialize`
        requested: ModuleId,
        /// Beacon's current module
        current: ModuleId,
    },

    /// Operation needs a different routing mode
    #[error("operation not available in {mode} mode")]
    RoutingModeMismatch {
        /// Actual routing mode
        mode: RoutingMode,
    },

    /// Reserved selectors cannot be routed
    #[error("selector {selector} is reserved")]
    ReservedSelector {
        /// Offending selector
        selector: Selector,
    },

    /// Governance payload could not be decoded
    #[error("invalid admin call: {reason}")]
    InvalidAdminCall {
        /// Decoder message
        reason: String,
    },

    /// Lifecycle transition outside the transition table
    #[error("illegal lifecycle transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: Lifecycle,
        /// Requested state
        to: Lifecycle,
    },
}

impl DispatchError {
    /// Classify what this failure left behind
    ///
    /// Module failures and budget exhaustion happen after code ran and are
    /// always rolled back; every other variant is refused up front.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::ResourceExhausted { .. } | Self::ForwardedFailure(_) => Outcome::RolledBack,
            _ => Outcome::Rejected,
        }
    }

    /// Check if this is an authorization failure
    #[inline]
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Module fault behind a forwarded failure
    #[must_use]
    pub fn fault(&self) -> Option<&ModuleFault> {
        match self {
            Self::ForwardedFailure(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<RoutingError> for DispatchError {
    fn from(value: RoutingError) -> Self {
        match value {
            RoutingError::DuplicateRouteClaim {
                selector,
                first,
                second,
            } => Self::DuplicateRouteClaim {
                selector,
                first,
                second,
            },
            RoutingError::RouteNotFound { selector } => Self::RouteNotFound { selector },
            RoutingError::ModeMismatch { mode } => Self::RoutingModeMismatch { mode },
            RoutingError::ReservedSelector { selector } => Self::ReservedSelector { selector },
        }
    }
}

/// Surfaced to module code when a reentrant call fails
impl From<DispatchError> for ModuleFault {
    fn from(value: DispatchError) -> Self {
        ModuleFault::Reentry(Box::new(value))
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid config: {reason}")]
    Invalid {
        /// What is wrong
        reason: String,
    },
}

/// Audit log errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Hash chain broken at a record
    #[error("upgrade log integrity violation at record {sequence}")]
    IntegrityViolation {
        /// First record that fails verification
        sequence: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_classification() {
        assert_eq!(DispatchError::Unauthorized.outcome(), Outcome::Rejected);
        assert_eq!(
            DispatchError::ResourceExhausted { used: 10, limit: 5 }.outcome(),
            Outcome::RolledBack
        );
        assert_eq!(
            DispatchError::ForwardedFailure(ModuleFault::revert("x")).outcome(),
            Outcome::RolledBack
        );
    }

    #[test]
    fn routing_errors_convert() {
        let err: DispatchError = RoutingError::ModeMismatch {
            mode: RoutingMode::SinglePointer,
        }
        .into();
        assert!(matches!(
            err,
            DispatchError::RoutingModeMismatch {
                mode: RoutingMode::SinglePointer
            }
        ));
    }

    #[test]
    fn dispatch_error_round_trips_through_reentry_fault() {
        let fault: ModuleFault = DispatchError::ImmutableRoute.into();
        assert!(matches!(
            fault.reentry_error::<DispatchError>(),
            Some(DispatchError::ImmutableRoute)
        ));
    }
}
