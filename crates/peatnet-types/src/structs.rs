//! Persisted entity records.
//!
//! [`User`] and [`Chat`] are mutable rows changed only through the typed
//! patches in [`crate::patch`]. [`CourtCase`] and [`MiningEvent`] are
//! append-only log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{CourtType, Currency, HazardKind, MiningAction, Verdict};
use crate::ids::{CaseId, ChatId, UserId};

/// Primary balance granted to a newly seen user.
pub const STARTING_PRIMARY: u64 = 100;

/// Premium balance granted to a newly seen user.
pub const STARTING_PREMIUM: u64 = 5;

/// Upper bound of the health scale.
pub const MAX_HEALTH: u32 = 100;

/// Warning count at which warnings roll over into a perforation.
pub const WARNING_LIMIT: u32 = 3;

/// pH assigned to a freshly created chat.
pub const INITIAL_PH: f64 = 5.0;

/// A chat participant and their economy state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform user id.
    pub id: UserId,
    /// Primary (peat) balance.
    pub primary: u64,
    /// Premium (fiber) balance.
    pub premium: u64,
    /// Health on a 0..=100 scale.
    pub health: u32,
    /// Outstanding court warnings, always below [`WARNING_LIMIT`].
    pub warnings: u32,
    /// Untreated perforations; any nonzero value incapacitates the user.
    pub perforation_count: u32,
    /// Whether a ban has been recorded.
    pub is_banned: bool,
    /// When the recorded ban expires.
    pub banned_until: Option<DateTime<Utc>>,
    /// Cooldown anchor for mining and passive accrual.
    pub last_passive_income_at: DateTime<Utc>,
    /// Cooldown anchor for fiber collection.
    pub last_cellulose_at: DateTime<Utc>,
    /// First time the engine saw this user.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user with starting balances. Both cooldown anchors start at
    /// `now`, so the first harvest opens one interval after creation.
    pub const fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            primary: STARTING_PRIMARY,
            premium: STARTING_PREMIUM,
            health: MAX_HEALTH,
            warnings: 0,
            perforation_count: 0,
            is_banned: false,
            banned_until: None,
            last_passive_income_at: now,
            last_cellulose_at: now,
            created_at: now,
        }
    }

    /// Balance held in `currency`.
    pub const fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Primary => self.primary,
            Currency::Premium => self.premium,
        }
    }

    /// A user with an untreated perforation cannot mine.
    pub const fn is_incapacitated(&self) -> bool {
        self.perforation_count > 0
    }

    /// Expiry of a ban that is still running at `now`.
    ///
    /// Returns `None` for users that were never banned and for bans whose
    /// expiry has passed; the latter are cleared lazily by the engine.
    pub fn ban_active(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_banned {
            return None;
        }
        match self.banned_until {
            Some(until) if until > now => Some(until),
            _ => None,
        }
    }

    /// Whether a ban is recorded but has already run out.
    pub fn ban_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_banned && self.ban_active(now).is_none()
    }
}

/// One chat ecosystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Platform chat id.
    pub id: ChatId,
    /// Current soil acidity, nominally 0..=14.
    pub ph_level: f64,
    /// When the danger scheduler last fired for this chat.
    pub last_danger_at: Option<DateTime<Utc>>,
    /// Kind of the last hazard fired for this chat.
    pub danger_type: Option<HazardKind>,
    /// A turtle swarm is waiting for defenders.
    pub turtle_active: bool,
    /// A CO2 emission is waiting to be countered.
    pub co2_active: bool,
}

impl Chat {
    /// A fresh ecosystem with the default pH and no hazards.
    pub const fn new(id: ChatId) -> Self {
        Self {
            id,
            ph_level: INITIAL_PH,
            last_danger_at: None,
            danger_type: None,
            turtle_active: false,
            co2_active: false,
        }
    }
}

/// A resolved court case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtCase {
    /// Case id assigned at filing.
    pub id: CaseId,
    /// Who filed.
    pub plaintiff: UserId,
    /// Who was sued.
    pub defendant: UserId,
    /// Which court heard the case.
    pub court_type: CourtType,
    /// Outcome tag.
    pub verdict: Verdict,
    /// Primary currency actually moved from the defendant.
    pub fine: u64,
    /// Short machine-readable summary of the penalty applied.
    pub result: String,
    /// When the verdict was reached.
    pub decided_at: DateTime<Utc>,
}

/// An append-only economy log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningEvent {
    /// Affected user.
    pub user_id: UserId,
    /// What happened.
    pub action: MiningAction,
    /// Signed amount; debits are negative.
    pub amount: i64,
    /// When it happened.
    pub at: DateTime<Utc>,
}

impl MiningEvent {
    /// Build a log record.
    pub const fn new(user_id: UserId, action: MiningAction, amount: i64, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            action,
            amount,
            at,
        }
    }
}
