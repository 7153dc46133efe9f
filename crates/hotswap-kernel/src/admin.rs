//! Governance call codec
//!
//! Governance travels on reserved selectors like any other invocation. The
//! payload is a JSON-encoded [`AdminCall`] whose kind must match the
//! selector it arrives on.

use crate::error::DispatchError;
use hotswap_module::{Identity, ModuleId, ProposedAction, Selector};
use hotswap_routing::RouteBatch;
use serde::{Deserialize, Serialize};

const UPGRADE: u8 = 0x01;
const CUT: u8 = 0x02;
const RENOUNCE_ADMIN: u8 = 0x03;
const TRANSFER_ADMIN: u8 = 0x04;
const FREEZE: u8 = 0x05;

/// Governance operation carried on a reserved selector
///
/// `auth` is opaque to the dispatcher. Self-authorizing dispatchers forward
/// it to the governing module; other trust models ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum AdminCall {
    /// Replace the default target
    Upgrade {
        /// New module
        module: ModuleId,
        /// Authorization payload
        #[serde(default)]
        auth: Vec<u8>,
    },
    /// Apply a routing batch (multi-entry only)
    Cut {
        /// Changes to apply
        batch: RouteBatch,
        /// Authorization payload
        #[serde(default)]
        auth: Vec<u8>,
    },
    /// Clear the admin permanently
    RenounceAdmin {
        /// Authorization payload
        #[serde(default)]
        auth: Vec<u8>,
    },
    /// Move admin authority
    TransferAdmin {
        /// New admin
        to: Identity,
        /// Authorization payload
        #[serde(default)]
        auth: Vec<u8>,
    },
    /// Stop the dispatcher permanently
    Freeze {
        /// Authorization payload
        #[serde(default)]
        auth: Vec<u8>,
    },
}

impl AdminCall {
    /// Upgrade call
    #[must_use]
    pub fn upgrade(module: ModuleId, auth: Option<&[u8]>) -> Self {
        Self::Upgrade {
            module,
            auth: owned(auth),
        }
    }

    /// Routing batch call
    #[must_use]
    pub fn cut(batch: RouteBatch, auth: Option<&[u8]>) -> Self {
        Self::Cut {
            batch,
            auth: owned(auth),
        }
    }

    /// Renounce call
    #[must_use]
    pub fn renounce_admin(auth: Option<&[u8]>) -> Self {
        Self::RenounceAdmin { auth: owned(auth) }
    }

    /// Transfer call
    #[must_use]
    pub fn transfer_admin(to: Identity, auth: Option<&[u8]>) -> Self {
        Self::TransferAdmin {
            to,
            auth: owned(auth),
        }
    }

    /// Freeze call
    #[must_use]
    pub fn freeze(auth: Option<&[u8]>) -> Self {
        Self::Freeze { auth: owned(auth) }
    }

    /// Reserved selector this call travels on
    #[must_use]
    pub fn selector(&self) -> Selector {
        Selector::reserved(match self {
            Self::Upgrade { .. } => UPGRADE,
            Self::Cut { .. } => CUT,
            Self::RenounceAdmin { .. } => RENOUNCE_ADMIN,
            Self::TransferAdmin { .. } => TRANSFER_ADMIN,
            Self::Freeze { .. } => FREEZE,
        })
    }

    /// Authorization payload
    #[must_use]
    pub fn auth(&self) -> &[u8] {
        match self {
            Self::Upgrade { auth, .. }
            | Self::Cut { auth, .. }
            | Self::RenounceAdmin { auth }
            | Self::TransferAdmin { auth, .. }
            | Self::Freeze { auth } => auth,
        }
    }

    /// Check if this call changes routing
    #[must_use]
    pub fn mutates_routing(&self) -> bool {
        matches!(self, Self::Upgrade { .. } | Self::Cut { .. })
    }

    /// Action as presented to a governing module
    #[must_use]
    pub fn proposed_action(&self) -> ProposedAction {
        match self {
            Self::Upgrade { module, .. } => ProposedAction::Upgrade { to: *module },
            Self::Cut { batch, .. } => ProposedAction::Cut {
                changes: batch.claims(),
            },
            Self::RenounceAdmin { .. } => ProposedAction::RenounceAdmin,
            Self::TransferAdmin { to, .. } => ProposedAction::TransferAdmin { to: *to },
            Self::Freeze { .. } => ProposedAction::Freeze,
        }
    }

    /// Encode as an invocation payload
    ///
    /// # Errors
    /// [`DispatchError::InvalidAdminCall`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(self).map_err(|e| DispatchError::InvalidAdminCall {
            reason: e.to_string(),
        })
    }

    /// Decode a payload received on `selector`
    ///
    /// # Errors
    /// [`DispatchError::InvalidAdminCall`] on malformed JSON or when the
    /// call kind does not match the selector.
    pub fn decode(selector: Selector, payload: &[u8]) -> Result<Self, DispatchError> {
        let call: Self =
            serde_json::from_slice(payload).map_err(|e| DispatchError::InvalidAdminCall {
                reason: e.to_string(),
            })?;
        if call.selector() != selector {
            return Err(DispatchError::InvalidAdminCall {
                reason: format!("{} payload sent on selector {selector}", call.kind()),
            });
        }
        Ok(call)
    }

    /// Short name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upgrade { .. } => "upgrade",
            Self::Cut { .. } => "cut",
            Self::RenounceAdmin { .. } => "renounce_admin",
            Self::TransferAdmin { .. } => "transfer_admin",
            Self::Freeze { .. } => "freeze",
        }
    }
}

fn owned(auth: Option<&[u8]>) -> Vec<u8> {
    auth.map(<[u8]>::to_vec).unwrap_or_default()
}
