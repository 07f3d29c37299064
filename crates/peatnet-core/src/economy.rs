//! Mining, prospecting, fiber collection, exchange and passive accrual.
//!
//! # Cooldown anchors
//!
//! `last_passive_income_at` is the only record of when a user last earned
//! mining income. A manual [`Economy::mine`] resets it to the current time;
//! the periodic [`Economy::sweep_passive_income`] credits whole elapsed
//! intervals and advances it by exactly that many intervals. Both run under
//! the user's row lock, so no interval is ever paid twice.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use peatnet_types::{
    ChatId, ChatPatch, Currency, EngineEvent, HazardCause, HazardKind, MiningAction, MiningEvent,
    UserId, UserPatch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EconomyConfig, secs};
use crate::context::Context;
use crate::error::{EngineError, StoreError};
use crate::store::{Commit, EntityStore};

/// Result of a successful manual mine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineOutcome {
    /// Primary credited.
    pub income: u64,
    /// pH yield modifier applied, in percent.
    pub yield_percent: u64,
    /// Primary balance afterwards.
    pub primary: u64,
}

/// What a prospecting attempt turned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "find", rename_all = "snake_case")]
pub enum ProspectFind {
    /// Hit a CO2 pocket and lost primary.
    Co2 {
        /// Primary actually lost.
        loss: u64,
    },
    /// Hit a rich vein.
    Jackpot {
        /// Primary won.
        bonus: u64,
    },
    /// Ordinary find.
    Vein {
        /// Primary won.
        bonus: u64,
    },
}

/// Result of a prospecting attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectOutcome {
    /// What was found.
    pub find: ProspectFind,
    /// Primary balance afterwards.
    pub primary: u64,
}

/// Result of a fiber collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CelluloseOutcome {
    /// Premium credited.
    pub amount: u64,
    /// Premium balance afterwards.
    pub premium: u64,
}

/// Result of a currency exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOutcome {
    /// Primary spent.
    pub spent: u64,
    /// Premium bought.
    pub bought: u64,
    /// Primary balance afterwards.
    pub primary: u64,
    /// Premium balance afterwards.
    pub premium: u64,
}

/// Result of perforation treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentOutcome {
    /// Premium paid.
    pub cost: u64,
    /// Health afterwards.
    pub health: u32,
    /// Premium balance afterwards.
    pub premium: u64,
}

/// Totals of one passive accrual sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Users inspected.
    pub users_seen: usize,
    /// Users who received income.
    pub users_credited: usize,
    /// Primary credited in total.
    pub total: u64,
    /// Users skipped because the store failed.
    pub failures: usize,
}

/// Time left before `anchor + interval` is reached, or `None` once it has.
///
/// Never exceeds the interval, even if the anchor lies in the future.
pub fn cooldown_remaining(
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
    interval_secs: u64,
) -> Option<Duration> {
    let interval = secs(interval_secs);
    let elapsed = now.signed_duration_since(anchor);
    if elapsed >= interval {
        return None;
    }
    let remaining = interval
        .checked_sub(&elapsed)
        .unwrap_or(interval)
        .min(interval);
    Some(remaining.to_std().unwrap_or_default())
}

/// Mining yield in percent for a pH reading.
pub fn yield_percent(config: &EconomyConfig, ph: f64) -> u64 {
    if ph < config.acid_threshold {
        config.acid_yield_percent
    } else if ph > config.neutral_threshold {
        config.neutral_yield_percent
    } else {
        100
    }
}

pub(crate) fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

pub(crate) fn insufficient(currency: Currency, required: u64, available: u64) -> EngineError {
    EngineError::InsufficientFunds {
        currency,
        required,
        available,
    }
}

/// Command-driven economy operations plus the passive sweep.
pub struct Economy<S> {
    ctx: Context<S>,
}

impl<S> Clone for Economy<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: EntityStore> Economy<S> {
    /// Build the economy over shared handles.
    pub const fn new(ctx: Context<S>) -> Self {
        Self { ctx }
    }

    /// Mine primary currency in a chat, once per mining interval.
    ///
    /// Fails with [`EngineError::Incapacitated`] before considering the
    /// cooldown.
    pub async fn mine(&self, user: UserId, chat: ChatId) -> Result<MineOutcome, EngineError> {
        let now = self.ctx.now();
        let economy = &self.ctx.config.economy;
        let scope = self.ctx.scope(now).chat(chat).actor(user);

        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let current = view.require_user(user)?;
                if current.is_incapacitated() {
                    return Err(EngineError::Incapacitated);
                }
                if let Some(remaining) = cooldown_remaining(
                    current.last_passive_income_at,
                    now,
                    economy.mining_interval_secs,
                ) {
                    return Err(EngineError::InCooldown { remaining });
                }

                let ph = view.require_chat()?.ph_level;
                let percent = yield_percent(economy, ph);
                let income = economy.mining_base_rate.saturating_mul(percent) / 100;
                let outcome = MineOutcome {
                    income,
                    yield_percent: percent,
                    primary: current.primary.saturating_add(income),
                };
                Ok(Commit::new(outcome)
                    .user(
                        user,
                        UserPatch::new()
                            .credit(Currency::Primary, income)
                            .passive_anchor(now),
                    )
                    .log(MiningEvent::new(user, MiningAction::Mining, signed(income), now)))
            })
            .await?;

        debug!(%user, %chat, income = outcome.income, percent = outcome.yield_percent, "mined");
        Ok(outcome)
    }

    /// Prospect for peat. Requires `prospect_cost` primary but does not
    /// charge it; exactly one log record is written per call.
    pub async fn prospect(
        &self,
        user: UserId,
        chat: ChatId,
    ) -> Result<ProspectOutcome, EngineError> {
        let now = self.ctx.now();
        let economy = &self.ctx.config.economy;
        let dice = &self.ctx.dice;
        let scope = self.ctx.scope(now).chat(chat).actor(user);

        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let current = view.require_user(user)?;
                if current.primary < economy.prospect_cost {
                    return Err(insufficient(
                        Currency::Primary,
                        economy.prospect_cost,
                        current.primary,
                    ));
                }

                let draw = dice.unit();
                let (find, patch, chat_patch, action) = if draw < economy.co2_probability {
                    let loss = dice.between(economy.co2_loss).min(current.primary);
                    (
                        ProspectFind::Co2 { loss },
                        UserPatch::new().debit(Currency::Primary, loss),
                        ChatPatch::new().co2(true).danger(now, HazardKind::Co2),
                        MiningAction::ProspectCo2,
                    )
                } else if draw < economy.co2_probability + economy.jackpot_probability {
                    let bonus = dice.between(economy.jackpot_bonus);
                    (
                        ProspectFind::Jackpot { bonus },
                        UserPatch::new().credit(Currency::Primary, bonus),
                        ChatPatch::new(),
                        MiningAction::ProspectJackpot,
                    )
                } else {
                    let bonus = dice.between(economy.normal_find);
                    (
                        ProspectFind::Vein { bonus },
                        UserPatch::new().credit(Currency::Primary, bonus),
                        ChatPatch::new(),
                        MiningAction::ProspectNormal,
                    )
                };

                let (primary, amount) = match find {
                    ProspectFind::Co2 { loss } => (
                        current.primary.saturating_sub(loss),
                        signed(loss).saturating_neg(),
                    ),
                    ProspectFind::Jackpot { bonus } | ProspectFind::Vein { bonus } => {
                        (current.primary.saturating_add(bonus), signed(bonus))
                    }
                };
                Ok(Commit::new(ProspectOutcome { find, primary })
                    .user(user, patch)
                    .chat(chat_patch)
                    .log(MiningEvent::new(user, action, amount, now)))
            })
            .await?;

        if matches!(outcome.find, ProspectFind::Co2 { .. }) {
            info!(%chat, %user, "prospecting released CO2");
            self.ctx.events.publish(EngineEvent::HazardSpawned {
                chat_id: chat,
                kind: HazardKind::Co2,
                cause: HazardCause::Prospecting,
                severity: None,
                generation: None,
                at: now,
            });
        }
        debug!(%user, %chat, find = ?outcome.find, "prospected");
        Ok(outcome)
    }

    /// Collect the daily premium fiber.
    pub async fn collect_cellulose(&self, user: UserId) -> Result<CelluloseOutcome, EngineError> {
        let now = self.ctx.now();
        let economy = &self.ctx.config.economy;
        let dice = &self.ctx.dice;
        let scope = self.ctx.scope(now).user(user);

        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let current = view.require_user(user)?;
                if let Some(remaining) = cooldown_remaining(
                    current.last_cellulose_at,
                    now,
                    economy.cellulose_interval_secs,
                ) {
                    return Err(EngineError::InCooldown { remaining });
                }

                let jitter = dice.jitter(economy.cellulose_jitter);
                let amount = u64::try_from(signed(economy.cellulose_base).saturating_add(jitter))
                    .unwrap_or(0);
                let outcome = CelluloseOutcome {
                    amount,
                    premium: current.premium.saturating_add(amount),
                };
                Ok(Commit::new(outcome)
                    .user(
                        user,
                        UserPatch::new()
                            .credit(Currency::Premium, amount)
                            .cellulose_anchor(now),
                    )
                    .log(MiningEvent::new(user, MiningAction::Cellulose, signed(amount), now)))
            })
            .await?;

        debug!(%user, amount = outcome.amount, "collected cellulose");
        Ok(outcome)
    }

    /// Buy `amount` premium at the configured rate.
    pub async fn exchange(&self, user: UserId, amount: i64) -> Result<ExchangeOutcome, EngineError> {
        let bought = u64::try_from(amount)
            .ok()
            .filter(|value| *value > 0)
            .ok_or_else(|| EngineError::InvalidArgument {
                reason: format!("exchange amount must be positive, got {amount}"),
            })?;
        let rate = self.ctx.config.economy.exchange_rate;
        let cost = bought
            .checked_mul(rate)
            .ok_or_else(|| EngineError::InvalidArgument {
                reason: format!("exchange amount {amount} is too large"),
            })?;

        let now = self.ctx.now();
        let scope = self.ctx.scope(now).user(user);
        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let current = view.require_user(user)?;
                if current.primary < cost {
                    return Err(insufficient(Currency::Primary, cost, current.primary));
                }
                let outcome = ExchangeOutcome {
                    spent: cost,
                    bought,
                    primary: current.primary.saturating_sub(cost),
                    premium: current.premium.saturating_add(bought),
                };
                Ok(Commit::new(outcome)
                    .user(
                        user,
                        UserPatch::new()
                            .debit(Currency::Primary, cost)
                            .credit(Currency::Premium, bought),
                    )
                    .log(MiningEvent::new(
                        user,
                        MiningAction::Exchange,
                        signed(cost).saturating_neg(),
                        now,
                    )))
            })
            .await?;

        debug!(%user, spent = cost, bought, "exchanged");
        Ok(outcome)
    }

    /// Heal all perforations for a premium fee.
    pub async fn treat_perforation(&self, user: UserId) -> Result<TreatmentOutcome, EngineError> {
        let now = self.ctx.now();
        let economy = &self.ctx.config.economy;
        let scope = self.ctx.scope(now).user(user);

        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let current = view.require_user(user)?;
                if !current.is_incapacitated() {
                    return Err(EngineError::NoEffectNeeded);
                }
                if current.premium < economy.treatment_cost {
                    return Err(insufficient(
                        Currency::Premium,
                        economy.treatment_cost,
                        current.premium,
                    ));
                }
                let patch = UserPatch::new()
                    .debit(Currency::Premium, economy.treatment_cost)
                    .heal_perforations()
                    .adjust_health(i64::from(economy.treatment_heal));
                let next = patch.apply(current).map_err(StoreError::from)?;
                Ok(Commit::new(TreatmentOutcome {
                    cost: economy.treatment_cost,
                    health: next.health,
                    premium: next.premium,
                })
                .user(user, patch)
                .log(MiningEvent::new(
                    user,
                    MiningAction::Treatment,
                    signed(economy.treatment_cost).saturating_neg(),
                    now,
                )))
            })
            .await?;

        info!(%user, health = outcome.health, "perforation treated");
        Ok(outcome)
    }

    /// Credit every user whose mining interval has fully elapsed with one
    /// base rate per whole elapsed interval.
    ///
    /// Store failures are logged per user and do not stop the sweep.
    pub async fn sweep_passive_income(&self) -> Result<SweepReport, EngineError> {
        let users = self.ctx.store.user_ids().await?;
        let mut report = SweepReport {
            users_seen: users.len(),
            ..SweepReport::default()
        };
        for user in users {
            match self.accrue(user).await {
                Ok(0) => {}
                Ok(credited) => {
                    report.users_credited = report.users_credited.saturating_add(1);
                    report.total = report.total.saturating_add(credited);
                }
                Err(err) => {
                    report.failures = report.failures.saturating_add(1);
                    warn!(%user, error = %err, "passive accrual failed");
                }
            }
        }
        if report.users_credited > 0 || report.failures > 0 {
            info!(
                users = report.users_credited,
                total = report.total,
                failures = report.failures,
                "passive income sweep complete"
            );
        }
        Ok(report)
    }

    async fn accrue(&self, user: UserId) -> Result<u64, EngineError> {
        let now = self.ctx.now();
        let economy = &self.ctx.config.economy;
        let interval = signed(economy.mining_interval_secs);
        let scope = self.ctx.scope(now).existing(user);

        self.ctx
            .store
            .transact(scope, |view| {
                let Some(current) = view.user(user) else {
                    return Ok(Commit::new(0));
                };
                let elapsed = now
                    .signed_duration_since(current.last_passive_income_at)
                    .num_seconds();
                let intervals = elapsed.checked_div(interval).unwrap_or(0);
                if intervals < 1 {
                    return Ok(Commit::new(0));
                }
                let whole = u64::try_from(intervals).unwrap_or(0);
                let credit = whole.saturating_mul(economy.mining_base_rate);
                let anchor = current
                    .last_passive_income_at
                    .checked_add_signed(TimeDelta::seconds(intervals.saturating_mul(interval)))
                    .unwrap_or(now);
                Ok(Commit::new(credit)
                    .user(
                        user,
                        UserPatch::new()
                            .credit(Currency::Primary, credit)
                            .passive_anchor(anchor),
                    )
                    .log(MiningEvent::new(
                        user,
                        MiningAction::PassiveSweep,
                        signed(credit),
                        now,
                    )))
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::Arc;

    use peatnet_types::{Chat, User};

    use super::*;
    use crate::clock::{Clock as _, ManualClock};
    use crate::config::EngineConfig;
    use crate::dice::ScriptedDice;
    use crate::events::EventBus;
    use crate::memory::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        dice: Arc<ScriptedDice>,
        economy: Economy<MemoryStore>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dice = Arc::new(ScriptedDice::new(42));
        let ctx = Context::new(
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
            Arc::clone(&dice) as Arc<dyn crate::dice::Dice>,
            EventBus::new(),
            Arc::new(EngineConfig::default()),
        );
        Harness {
            store,
            clock,
            dice,
            economy: Economy::new(ctx),
        }
    }

    async fn seed_user(h: &Harness, id: i64, primary: u64, premium: u64, hours_ago: i64) {
        let mut user = User::new(UserId(id), h.clock.now() - TimeDelta::hours(hours_ago));
        user.primary = primary;
        user.premium = premium;
        h.store.put_user(user).await;
    }

    async fn seed_chat(h: &Harness, ph: f64) {
        let mut chat = Chat::new(ChatId(1));
        chat.ph_level = ph;
        h.store.put_chat(chat).await;
    }

    #[tokio::test]
    async fn mine_applies_ph_modifier() {
        let h = harness();
        seed_user(&h, 1, 100, 5, 2).await;
        seed_chat(&h, 4.2).await;
        let outcome = h.economy.mine(UserId(1), ChatId(1)).await.unwrap();
        assert_eq!(outcome.income, 7);
        assert_eq!(outcome.primary, 107);

        seed_user(&h, 2, 100, 5, 2).await;
        seed_chat(&h, 7.0).await;
        let outcome = h.economy.mine(UserId(2), ChatId(1)).await.unwrap();
        assert_eq!(outcome.income, 13);
    }

    #[tokio::test]
    async fn second_mine_is_on_cooldown() {
        let h = harness();
        seed_user(&h, 1, 100, 5, 2).await;
        h.economy.mine(UserId(1), ChatId(1)).await.unwrap();
        h.clock.advance(TimeDelta::minutes(10));
        let err = h.economy.mine(UserId(1), ChatId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InCooldown { remaining } if remaining == Duration::from_secs(50 * 60)
        ));
    }

    #[tokio::test]
    async fn new_users_wait_one_interval() {
        let h = harness();
        let err = h.economy.mine(UserId(9), ChatId(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::InCooldown { .. }));
        assert!(h.store.user(UserId(9)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn perforated_users_cannot_mine() {
        let h = harness();
        let mut user = User::new(UserId(1), h.clock.now());
        user.perforation_count = 1;
        h.store.put_user(user).await;
        let err = h.economy.mine(UserId(1), ChatId(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Incapacitated));
    }

    #[tokio::test]
    async fn prospect_requires_minimum_balance() {
        let h = harness();
        seed_user(&h, 1, 9, 5, 0).await;
        let err = h.economy.prospect(UserId(1), ChatId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds {
                currency: Currency::Primary,
                required: 10,
                available: 9
            }
        ));
    }

    #[tokio::test]
    async fn prospect_co2_loss_never_goes_negative() {
        let h = harness();
        seed_user(&h, 1, 12, 5, 0).await;
        h.dice.push_units([0.01]);
        h.dice.push_amounts([40]);
        let outcome = h.economy.prospect(UserId(1), ChatId(1)).await.unwrap();
        assert_eq!(outcome.find, ProspectFind::Co2 { loss: 12 });
        assert_eq!(outcome.primary, 0);
        let chat = h.store.chat(ChatId(1)).await.unwrap().unwrap();
        assert!(chat.co2_active);
        assert_eq!(chat.danger_type, Some(HazardKind::Co2));
        assert_eq!(chat.last_danger_at, Some(h.clock.now()));
        assert_eq!(h.store.mining_log().len(), 1);
    }

    #[tokio::test]
    async fn prospect_jackpot_and_vein() {
        let h = harness();
        seed_user(&h, 1, 100, 5, 0).await;
        h.dice.push_units([0.12, 0.9]);
        h.dice.push_amounts([150, 7]);
        let jackpot = h.economy.prospect(UserId(1), ChatId(1)).await.unwrap();
        assert_eq!(jackpot.find, ProspectFind::Jackpot { bonus: 150 });
        let vein = h.economy.prospect(UserId(1), ChatId(1)).await.unwrap();
        assert_eq!(vein.find, ProspectFind::Vein { bonus: 7 });
        assert_eq!(vein.primary, 257);
        let chat = h.store.chat(ChatId(1)).await.unwrap().unwrap();
        assert!(chat.danger_type.is_none() && chat.last_danger_at.is_none());
    }

    #[tokio::test]
    async fn cellulose_collects_with_jitter() {
        let h = harness();
        seed_user(&h, 1, 100, 5, 25).await;
        h.dice.push_jitters([-1]);
        let outcome = h.economy.collect_cellulose(UserId(1)).await.unwrap();
        assert_eq!(outcome.amount, 2);
        assert_eq!(outcome.premium, 7);
        let err = h.economy.collect_cellulose(UserId(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::InCooldown { .. }));
    }

    #[tokio::test]
    async fn exchange_validates_amount_and_funds() {
        let h = harness();
        seed_user(&h, 1, 100, 0, 0).await;
        assert!(matches!(
            h.economy.exchange(UserId(1), 0).await,
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            h.economy.exchange(UserId(1), -3).await,
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            h.economy.exchange(UserId(1), 6).await,
            Err(EngineError::InsufficientFunds { required: 120, .. })
        ));
        let outcome = h.economy.exchange(UserId(1), 5).await.unwrap();
        assert_eq!((outcome.primary, outcome.premium), (0, 5));
    }

    #[tokio::test]
    async fn treatment_heals_perforations() {
        let h = harness();
        let mut user = User::new(UserId(1), h.clock.now());
        user.premium = 20;
        user.health = 40;
        user.perforation_count = 2;
        h.store.put_user(user).await;

        let outcome = h.economy.treat_perforation(UserId(1)).await.unwrap();
        assert_eq!(outcome.health, 70);
        assert_eq!(outcome.premium, 5);
        let healed = h.store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(healed.perforation_count, 0);

        let err = h.economy.treat_perforation(UserId(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::NoEffectNeeded));
    }

    #[tokio::test]
    async fn sweep_credits_whole_intervals_once() {
        let h = harness();
        let mut user = User::new(UserId(1), h.clock.now());
        user.last_passive_income_at = h.clock.now() - TimeDelta::minutes(150);
        h.store.put_user(user).await;

        let report = h.economy.sweep_passive_income().await.unwrap();
        assert_eq!(report.total, 20);
        let after = h.store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(after.primary, 120);
        assert_eq!(
            after.last_passive_income_at,
            h.clock.now() - TimeDelta::minutes(30)
        );

        let report = h.economy.sweep_passive_income().await.unwrap();
        assert_eq!(report.total, 0);

        h.clock.advance(TimeDelta::minutes(30));
        let report = h.economy.sweep_passive_income().await.unwrap();
        assert_eq!(report.total, 10);
    }

    #[tokio::test]
    async fn mine_then_sweep_does_not_double_pay() {
        let h = harness();
        seed_user(&h, 1, 100, 5, 1).await;
        h.economy.mine(UserId(1), ChatId(1)).await.unwrap();
        let report = h.economy.sweep_passive_income().await.unwrap();
        assert_eq!(report.total, 0);
    }

    #[test]
    fn cooldown_is_capped_at_interval() {
        let now = Utc::now();
        let future_anchor = now + TimeDelta::hours(5);
        let remaining = cooldown_remaining(future_anchor, now, 3600).unwrap();
        assert_eq!(remaining, Duration::from_secs(3600));
        assert!(cooldown_remaining(now - TimeDelta::hours(1), now, 3600).is_none());
    }
}
