//! Module-level failures
//!
//! Everything a module (or the host acting on its behalf) can fail with.
//! The dispatcher never reinterprets these; it wraps them unchanged.

use crate::ids::Selector;

/// Failure raised inside forwarded module execution
#[derive(Debug, thiserror::Error)]
pub enum ModuleFault {
    /// Module logic rejected the call
    #[error("reverted: {0}")]
    Revert(String),

    /// No entry point for this selector
    #[error("unknown entry point {0}")]
    UnknownEntry(Selector),

    /// Optional entry point not implemented by this module
    #[error("entry point '{0}' not supported")]
    Unsupported(&'static str),

    /// Access to a slot outside the module's declared regions
    #[error("slot {slot} is outside the storage lease")]
    LeaseViolation {
        /// Offending slot
        slot: u64,
    },

    /// Field tag not present in the module's layout
    #[error("unknown storage field '{0}'")]
    UnknownField(String),

    /// Authorization entry point refused
    #[error("authorization denied: {0}")]
    Denied(String),

    /// Payload could not be decoded
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Invocation budget is spent
    #[error("invocation budget exhausted")]
    BudgetExhausted,

    /// A call back into the dispatcher failed
    #[error("reentrant call failed: {0}")]
    Reentry(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl ModuleFault {
    /// Revert with a message
    #[inline]
    pub fn revert(message: impl Into<String>) -> Self {
        Self::Revert(message.into())
    }

    /// Deny authorization with a reason
    #[inline]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(reason.into())
    }

    /// Typed view of the error behind a failed reentrant call
    #[must_use]
    pub fn reentry_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Reentry(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}
