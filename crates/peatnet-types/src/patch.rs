//! Typed partial updates for [`User`] and [`Chat`] rows.
//!
//! Every mutation the engine makes goes through a patch. Applying a patch
//! never writes anything: it returns the updated record or a [`PatchError`]
//! naming the invariant the change would break. Stores apply all patches of
//! a transaction before committing any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{Currency, HazardKind};
use crate::ids::{ChatId, UserId};
use crate::structs::{Chat, MAX_HEALTH, User, WARNING_LIMIT};

/// Lowest pH a chat may ever hold.
pub const PH_MIN: f64 = 0.0;

/// Highest pH a chat may ever hold.
pub const PH_MAX: f64 = 14.0;

/// A patch would violate a record invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    /// A debit would push a balance below zero.
    #[error("{currency:?} balance of user {user} would go negative ({balance} {delta:+})")]
    NegativeBalance {
        /// Affected user.
        user: UserId,
        /// Which balance.
        currency: Currency,
        /// Balance before the change.
        balance: u64,
        /// Requested change.
        delta: i64,
    },

    /// A credit would overflow the balance type.
    #[error("{currency:?} balance of user {user} would overflow")]
    BalanceOverflow {
        /// Affected user.
        user: UserId,
        /// Which balance.
        currency: Currency,
    },

    /// A pH value outside the physical scale or not a number.
    #[error("pH {value} for chat {chat} is outside 0..=14")]
    InvalidPh {
        /// Affected chat.
        chat: ChatId,
        /// Rejected value.
        value: f64,
    },
}

// ---------------------------------------------------------------------------
// UserPatch
// ---------------------------------------------------------------------------

/// Change to a user's ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BanChange {
    /// Ban the user until the given instant.
    Until(DateTime<Utc>),
    /// Lift any recorded ban.
    Lift,
}

/// A formal court warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Health lost when this warning completes a set of three.
    pub rollover_health_loss: u32,
}

/// Partial update of a [`User`].
///
/// Fields are applied in declaration order: balances, health, warnings,
/// perforations, ban, then cooldown anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    /// Signed change of the primary balance.
    pub primary_delta: i64,
    /// Signed change of the premium balance.
    pub premium_delta: i64,
    /// Absolute health value, applied before `health_delta`.
    pub health_set: Option<u32>,
    /// Signed health change, clamped into 0..=100.
    pub health_delta: i64,
    /// Issue one warning.
    pub warning: Option<Warning>,
    /// Reset warnings to zero.
    pub reset_warnings: bool,
    /// Record one new perforation.
    pub add_perforation: bool,
    /// Heal all perforations.
    pub clear_perforations: bool,
    /// Ban or unban.
    pub ban: Option<BanChange>,
    /// New mining/passive cooldown anchor.
    pub passive_anchor: Option<DateTime<Utc>>,
    /// New fiber cooldown anchor.
    pub cellulose_anchor: Option<DateTime<Utc>>,
}

impl UserPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to a balance.
    #[must_use]
    pub fn credit(mut self, currency: Currency, amount: u64) -> Self {
        let delta = i64::try_from(amount).unwrap_or(i64::MAX);
        self.shift(currency, delta);
        self
    }

    /// Remove `amount` from a balance.
    #[must_use]
    pub fn debit(mut self, currency: Currency, amount: u64) -> Self {
        let delta = i64::try_from(amount).map_or(i64::MIN, |v| v.saturating_neg());
        self.shift(currency, delta);
        self
    }

    fn shift(&mut self, currency: Currency, delta: i64) {
        let slot = match currency {
            Currency::Primary => &mut self.primary_delta,
            Currency::Premium => &mut self.premium_delta,
        };
        *slot = slot.saturating_add(delta);
    }

    /// Set health to an absolute value.
    #[must_use]
    pub const fn set_health(mut self, value: u32) -> Self {
        self.health_set = Some(value);
        self
    }

    /// Change health by a signed amount.
    #[must_use]
    pub const fn adjust_health(mut self, delta: i64) -> Self {
        self.health_delta = self.health_delta.saturating_add(delta);
        self
    }

    /// Issue a warning that costs `rollover_health_loss` health when it
    /// completes a set.
    #[must_use]
    pub const fn warn(mut self, rollover_health_loss: u32) -> Self {
        self.warning = Some(Warning {
            rollover_health_loss,
        });
        self
    }

    /// Reset warnings to zero.
    #[must_use]
    pub const fn reset_warnings(mut self) -> Self {
        self.reset_warnings = true;
        self
    }

    /// Record a new perforation.
    #[must_use]
    pub const fn perforate(mut self) -> Self {
        self.add_perforation = true;
        self
    }

    /// Heal all perforations.
    #[must_use]
    pub const fn heal_perforations(mut self) -> Self {
        self.clear_perforations = true;
        self
    }

    /// Ban until `until`.
    #[must_use]
    pub const fn ban_until(mut self, until: DateTime<Utc>) -> Self {
        self.ban = Some(BanChange::Until(until));
        self
    }

    /// Lift a ban.
    #[must_use]
    pub const fn lift_ban(mut self) -> Self {
        self.ban = Some(BanChange::Lift);
        self
    }

    /// Move the mining cooldown anchor.
    #[must_use]
    pub const fn passive_anchor(mut self, at: DateTime<Utc>) -> Self {
        self.passive_anchor = Some(at);
        self
    }

    /// Move the fiber cooldown anchor.
    #[must_use]
    pub const fn cellulose_anchor(mut self, at: DateTime<Utc>) -> Self {
        self.cellulose_anchor = Some(at);
        self
    }

    /// Whether applying this patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to `user`, returning the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] if a balance would go negative or overflow.
    pub fn apply(&self, user: &User) -> Result<User, PatchError> {
        let mut next = user.clone();
        next.primary = shift_balance(user, Currency::Primary, user.primary, self.primary_delta)?;
        next.premium = shift_balance(user, Currency::Premium, user.premium, self.premium_delta)?;

        if let Some(value) = self.health_set {
            next.health = value.min(MAX_HEALTH);
        }
        next.health = shift_health(next.health, self.health_delta);

        if let Some(warning) = self.warning {
            let warnings = next.warnings.saturating_add(1);
            if warnings >= WARNING_LIMIT {
                next.warnings = 0;
                next.perforation_count = next.perforation_count.saturating_add(1);
                next.health = next.health.saturating_sub(warning.rollover_health_loss);
            } else {
                next.warnings = warnings;
            }
        }
        if self.reset_warnings {
            next.warnings = 0;
        }

        if self.add_perforation {
            next.perforation_count = next.perforation_count.saturating_add(1);
        }
        if self.clear_perforations {
            next.perforation_count = 0;
        }

        match self.ban {
            Some(BanChange::Until(until)) => {
                next.is_banned = true;
                next.banned_until = Some(until);
            }
            Some(BanChange::Lift) => {
                next.is_banned = false;
                next.banned_until = None;
            }
            None => {}
        }

        if let Some(at) = self.passive_anchor {
            next.last_passive_income_at = at;
        }
        if let Some(at) = self.cellulose_anchor {
            next.last_cellulose_at = at;
        }
        Ok(next)
    }
}

fn shift_balance(
    user: &User,
    currency: Currency,
    balance: u64,
    delta: i64,
) -> Result<u64, PatchError> {
    let magnitude = delta.unsigned_abs();
    if delta >= 0 {
        balance
            .checked_add(magnitude)
            .ok_or(PatchError::BalanceOverflow {
                user: user.id,
                currency,
            })
    } else {
        balance
            .checked_sub(magnitude)
            .ok_or(PatchError::NegativeBalance {
                user: user.id,
                currency,
                balance,
                delta,
            })
    }
}

fn shift_health(health: u32, delta: i64) -> u32 {
    let shifted = i64::from(health)
        .saturating_add(delta)
        .clamp(0, i64::from(MAX_HEALTH));
    u32::try_from(shifted).unwrap_or(MAX_HEALTH)
}

// ---------------------------------------------------------------------------
// ChatPatch
// ---------------------------------------------------------------------------

/// Partial update of a [`Chat`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPatch {
    /// New pH reading.
    pub ph_level: Option<f64>,
    /// Record a danger-scheduler firing.
    pub danger: Option<(DateTime<Utc>, HazardKind)>,
    /// Set or clear the turtle flag.
    pub turtle_active: Option<bool>,
    /// Set or clear the CO2 flag.
    pub co2_active: Option<bool>,
}

impl ChatPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pH reading.
    #[must_use]
    pub const fn ph(mut self, value: f64) -> Self {
        self.ph_level = Some(value);
        self
    }

    /// Record that `kind` fired at `at`.
    #[must_use]
    pub const fn danger(mut self, at: DateTime<Utc>, kind: HazardKind) -> Self {
        self.danger = Some((at, kind));
        self
    }

    /// Set the turtle flag.
    #[must_use]
    pub const fn turtles(mut self, active: bool) -> Self {
        self.turtle_active = Some(active);
        self
    }

    /// Set the CO2 flag.
    #[must_use]
    pub const fn co2(mut self, active: bool) -> Self {
        self.co2_active = Some(active);
        self
    }

    /// Whether applying this patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to `chat`, returning the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::InvalidPh`] for non-finite or out-of-scale pH.
    pub fn apply(&self, chat: &Chat) -> Result<Chat, PatchError> {
        let mut next = chat.clone();
        if let Some(value) = self.ph_level {
            if !value.is_finite() || !(PH_MIN..=PH_MAX).contains(&value) {
                return Err(PatchError::InvalidPh {
                    chat: chat.id,
                    value,
                });
            }
            next.ph_level = value;
        }
        if let Some((at, kind)) = self.danger {
            next.last_danger_at = Some(at);
            next.danger_type = Some(kind);
        }
        if let Some(active) = self.turtle_active {
            next.turtle_active = active;
        }
        if let Some(active) = self.co2_active {
            next.co2_active = active;
        }
        Ok(next)
    }
}
