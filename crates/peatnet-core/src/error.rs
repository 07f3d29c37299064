//! Error types for engine operations.
//!
//! [`EngineError`] is what every inbound operation returns. Most variants are
//! ordinary game outcomes the caller renders for the user; only
//! [`EngineError::Store`] is a genuine failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use peatnet_types::{Currency, PatchError};

/// Errors from the entity store contract.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },

    /// The backing store reported a failure.
    #[error("store backend error: {source}")]
    Backend {
        /// The underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A staged patch violates a record invariant; nothing was written.
    #[error("invariant violation: {0}")]
    Invariant(#[from] PatchError),

    /// A patch targets a record the transaction did not lock.
    #[error("{entity} {id} is not in the transaction scope")]
    OutOfScope {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: String,
    },

    /// A locked record vanished while the transaction ran.
    #[error("{entity} {id} is missing from the transaction view")]
    Missing {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: String,
    },
}

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The user cannot afford the action.
    #[error("insufficient {currency:?}: need {required}, have {available}")]
    InsufficientFunds {
        /// Currency that is short.
        currency: Currency,
        /// Amount needed.
        required: u64,
        /// Amount held.
        available: u64,
    },

    /// The action's cooldown has not elapsed.
    #[error("on cooldown for another {remaining:?}")]
    InCooldown {
        /// Time left, never more than the full interval.
        remaining: Duration,
    },

    /// The user has an untreated perforation.
    #[error("user is incapacitated by a perforation")]
    Incapacitated,

    /// A user tried to sue themselves.
    #[error("plaintiff and defendant are the same user")]
    SelfTarget,

    /// The defendant has never interacted with the bot.
    #[error("defendant not found")]
    DefendantNotFound,

    /// The defendant is serving a ban.
    #[error("defendant is banned until {until}")]
    DefendantBanned {
        /// Ban expiry.
        until: DateTime<Utc>,
    },

    /// There is no hazard to act against.
    #[error("no active hazard")]
    NoActiveHazard,

    /// The action would not change anything; nothing was charged.
    #[error("no effect needed")]
    NoEffectNeeded,

    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What is wrong.
        reason: String,
    },

    /// A queried record does not exist.
    #[error("{entity} {id} not found")]
    EntityNotFound {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: String,
    },

    /// The acting user is serving a ban.
    #[error("user is banned until {until}")]
    Banned {
        /// Ban expiry.
        until: DateTime<Utc>,
    },

    /// Storage failed; the operation made no changes.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the error is a game outcome to show the user, as opposed to a
    /// generic failure.
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    /// Stable snake-case tag naming the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InCooldown { .. } => "in_cooldown",
            Self::Incapacitated => "incapacitated",
            Self::SelfTarget => "self_target",
            Self::DefendantNotFound => "defendant_not_found",
            Self::DefendantBanned { .. } => "defendant_banned",
            Self::NoActiveHazard => "no_active_hazard",
            Self::NoEffectNeeded => "no_effect_needed",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::Banned { .. } => "banned",
            Self::Store(_) => "store",
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_not_user_facing() {
        let err = EngineError::from(StoreError::Unavailable {
            reason: "down".to_owned(),
        });
        assert!(!err.is_user_facing());
        assert!(EngineError::NoActiveHazard.is_user_facing());
        assert!(
            EngineError::InCooldown {
                remaining: Duration::from_secs(5)
            }
            .is_user_facing()
        );
    }

    #[test]
    fn messages_carry_amounts() {
        let err = EngineError::InsufficientFunds {
            currency: Currency::Premium,
            required: 10,
            available: 3,
        };
        assert_eq!(err.to_string(), "insufficient Premium: need 10, have 3");
        assert_eq!(err.kind(), "insufficient_funds");
    }
}
