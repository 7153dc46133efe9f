//! Dispatcher lifecycle state machine

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};

/// Lifecycle of a dispatcher instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Constructed, not yet bound to a module
    Uninitialized,
    /// Serving invocations
    Active,
    /// Governance operation in progress
    Upgrading,
    /// Permanently stopped
    Frozen,
}

impl Lifecycle {
    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [Lifecycle] {
        use Lifecycle::{Active, Frozen, Uninitialized, Upgrading};
        match self {
            Uninitialized => &[Active],
            Active => &[Upgrading, Frozen],
            Upgrading => &[Active, Frozen],
            Frozen => &[],
        }
    }

    /// Check a transition against the table
    ///
    /// # Errors
    /// [`DispatchError::IllegalTransition`] if `to` is not reachable.
    pub fn validate_transition(self, to: Lifecycle) -> Result<(), DispatchError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(DispatchError::IllegalTransition { from: self, to })
        }
    }

    /// Check if this state admits no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}
