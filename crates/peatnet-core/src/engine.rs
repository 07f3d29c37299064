//! The engine facade used by the command layer.
//!
//! [`Engine`] wires the components to one shared [`Context`] and exposes
//! every inbound operation as a method returning a structured result. User
//! commands pass through [`Engine::admit`] first, which lifts elapsed bans
//! and refuses users whose ban is still running.

use std::sync::Arc;

use peatnet_types::{
    CaseId, ChatId, CourtCase, CourtType, EngineEvent, MiningEvent, RemediationAction, RiskLevel,
    User, UserId, UserPatch,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::court::{CaseStatus, CourtEngine, Filing};
use crate::defense::{CounterOutcome, DefenseCoordinator, JoinOutcome};
use crate::dice::Dice;
use crate::economy::{
    CelluloseOutcome, Economy, ExchangeOutcome, MineOutcome, ProspectOutcome, SweepReport,
    TreatmentOutcome,
};
use crate::environment::{Diagnosis, Environment, RemediationOutcome};
use crate::error::{EngineError, StoreError};
use crate::events::EventBus;
use crate::scheduler::{DangerScheduler, FiringReport};
use crate::store::{Commit, EntityStore};

/// A user together with their derived perforation risk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    /// The stored record.
    pub user: User,
    /// How close the user is to (another) perforation.
    pub risk: RiskLevel,
}

/// Derive a user's perforation risk from their counters.
pub const fn perforation_risk(user: &User) -> RiskLevel {
    if user.perforation_count >= 2 {
        RiskLevel::Critical
    } else if user.perforation_count >= 1 {
        RiskLevel::High
    } else if user.warnings >= 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Every game operation behind one handle.
pub struct Engine<S> {
    ctx: Context<S>,
    economy: Economy<S>,
    environment: Environment<S>,
    scheduler: DangerScheduler<S>,
    defense: DefenseCoordinator<S>,
    court: CourtEngine<S>,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            economy: self.economy.clone(),
            environment: self.environment.clone(),
            scheduler: self.scheduler.clone(),
            defense: self.defense.clone(),
            court: self.court.clone(),
        }
    }
}

impl<S: EntityStore> Engine<S> {
    /// Build the engine over a store.
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        dice: Arc<dyn Dice>,
        config: EngineConfig,
    ) -> Self {
        let ctx = Context::new(store, clock, dice, EventBus::new(), Arc::new(config));
        let scheduler = DangerScheduler::new(ctx.clone());
        let defense = DefenseCoordinator::new(ctx.clone(), scheduler.hazards());
        Self {
            economy: Economy::new(ctx.clone()),
            environment: Environment::new(ctx.clone()),
            court: CourtEngine::new(ctx.clone()),
            scheduler,
            defense,
            ctx,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Outbound event bus.
    pub const fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    /// Subscribe to outbound events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.ctx.events.subscribe()
    }

    /// The danger scheduler.
    pub const fn scheduler(&self) -> &DangerScheduler<S> {
        &self.scheduler
    }

    /// The economy.
    pub const fn economy(&self) -> &Economy<S> {
        &self.economy
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Gate a user command: creates the user on first sight, lifts a ban
    /// that has run out, and fails with [`EngineError::Banned`] while one is
    /// still running.
    pub async fn admit(&self, user: UserId) -> Result<User, EngineError> {
        let now = self.ctx.now();
        let admitted = self
            .ctx
            .store
            .transact(self.ctx.scope(now).user(user), |view| {
                let current = view.require_user(user)?;
                if let Some(until) = current.ban_active(now) {
                    return Err(EngineError::Banned { until });
                }
                let patch = if current.ban_elapsed(now) {
                    UserPatch::new().lift_ban()
                } else {
                    UserPatch::new()
                };
                let next = patch.apply(current).map_err(StoreError::from)?;
                let lifted = !patch.is_empty();
                Ok(Commit::new((next, lifted)).user(user, patch))
            })
            .await?;
        let (record, lifted) = admitted;
        if lifted {
            info!(%user, "elapsed ban lifted");
        }
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Economy
    // -----------------------------------------------------------------------

    /// Mine primary currency.
    pub async fn mine(&self, user: UserId, chat: ChatId) -> Result<MineOutcome, EngineError> {
        self.admit(user).await?;
        self.economy.mine(user, chat).await
    }

    /// Prospect for a random find.
    pub async fn prospect(
        &self,
        user: UserId,
        chat: ChatId,
    ) -> Result<ProspectOutcome, EngineError> {
        self.admit(user).await?;
        self.economy.prospect(user, chat).await
    }

    /// Collect the daily cellulose.
    pub async fn collect_cellulose(&self, user: UserId) -> Result<CelluloseOutcome, EngineError> {
        self.admit(user).await?;
        self.economy.collect_cellulose(user).await
    }

    /// Buy `amount` premium with primary.
    pub async fn exchange(&self, user: UserId, amount: i64) -> Result<ExchangeOutcome, EngineError> {
        self.admit(user).await?;
        self.economy.exchange(user, amount).await
    }

    /// Heal all perforations.
    pub async fn treat_perforation(&self, user: UserId) -> Result<TreatmentOutcome, EngineError> {
        self.admit(user).await?;
        self.economy.treat_perforation(user).await
    }

    /// Run one passive income sweep.
    pub async fn sweep_passive_income(&self) -> Result<SweepReport, EngineError> {
        self.economy.sweep_passive_income().await
    }

    // -----------------------------------------------------------------------
    // Environment
    // -----------------------------------------------------------------------

    /// Pay to adjust a chat's pH.
    pub async fn remediate(
        &self,
        chat: ChatId,
        user: UserId,
        action: RemediationAction,
    ) -> Result<RemediationOutcome, EngineError> {
        self.admit(user).await?;
        self.environment.remediate(chat, user, action).await
    }

    /// Sample and diagnose a chat's pH, storing the reading if `persist`.
    pub async fn diagnose_chat(&self, chat: ChatId, persist: bool) -> Result<Diagnosis, EngineError> {
        self.environment.diagnose_chat(chat, persist).await
    }

    /// A drifted pH reading that is not stored.
    pub async fn sample_ph(&self, chat: ChatId) -> Result<f64, EngineError> {
        self.environment.sample_ph(chat).await
    }

    // -----------------------------------------------------------------------
    // Hazards
    // -----------------------------------------------------------------------

    /// Fire the danger scheduler once across all chats.
    pub async fn fire_dangers(&self) -> Result<FiringReport, EngineError> {
        self.scheduler.fire_all().await
    }

    /// Join the defense against a turtle swarm.
    pub async fn join_defense(&self, chat: ChatId, user: UserId) -> Result<JoinOutcome, EngineError> {
        self.admit(user).await?;
        self.defense.join(chat, user).await
    }

    /// Counter a CO2 release.
    pub async fn counter_co2(&self, chat: ChatId, user: UserId) -> Result<CounterOutcome, EngineError> {
        self.admit(user).await?;
        self.defense.counter_co2(chat, user).await
    }

    // -----------------------------------------------------------------------
    // Court
    // -----------------------------------------------------------------------

    /// File a court case.
    pub async fn file_court_case(
        &self,
        court_type: CourtType,
        plaintiff: UserId,
        defendant: UserId,
    ) -> Result<Filing, EngineError> {
        self.admit(plaintiff).await?;
        self.court.file(court_type, plaintiff, defendant).await
    }

    /// Where a case stands.
    pub async fn case_status(&self, id: CaseId) -> Result<CaseStatus, EngineError> {
        self.court.case_status(id).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// A user's record and risk level.
    pub async fn user_status(&self, user: UserId) -> Result<UserStatus, EngineError> {
        let record = self
            .ctx
            .store
            .user(user)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user))?;
        let risk = perforation_risk(&record);
        Ok(UserStatus { user: record, risk })
    }

    /// Richest users by primary balance.
    pub async fn top_users(&self, limit: usize) -> Result<Vec<User>, EngineError> {
        Ok(self.ctx.store.top_users(limit).await?)
    }

    /// Cases the user took part in, newest first.
    pub async fn court_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<CourtCase>, EngineError> {
        Ok(self.ctx.store.court_history(user, limit).await?)
    }

    /// The user's mining log, newest first.
    pub async fn mining_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<MiningEvent>, EngineError> {
        Ok(self.ctx.store.mining_history(user, limit).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::dice::ScriptedDice;
    use crate::memory::MemoryStore;

    fn engine() -> (Arc<MemoryStore>, Arc<ManualClock>, Engine<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(ScriptedDice::new(1)),
            EngineConfig::default(),
        );
        (store, clock, engine)
    }

    #[test]
    fn risk_levels_follow_counters() {
        let mut user = User::new(UserId(1), Utc::now());
        assert_eq!(perforation_risk(&user), RiskLevel::Low);
        user.warnings = 2;
        assert_eq!(perforation_risk(&user), RiskLevel::Medium);
        user.perforation_count = 1;
        assert_eq!(perforation_risk(&user), RiskLevel::High);
        user.perforation_count = 2;
        assert_eq!(perforation_risk(&user), RiskLevel::Critical);
    }

    #[tokio::test]
    async fn admit_refuses_then_lifts_ban() {
        let (store, clock, engine) = engine();
        let mut user = User::new(UserId(1), clock.now());
        user.is_banned = true;
        user.banned_until = Some(clock.now() + TimeDelta::hours(2));
        store.put_user(user).await;

        let err = engine.collect_cellulose(UserId(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Banned { .. }));

        clock.advance(TimeDelta::hours(3));
        let admitted = engine.admit(UserId(1)).await.unwrap();
        assert!(!admitted.is_banned);
        assert!(!store.user(UserId(1)).await.unwrap().unwrap().is_banned);
    }

    #[tokio::test]
    async fn admit_creates_on_first_sight() {
        let (store, _, engine) = engine();
        let user = engine.admit(UserId(42)).await.unwrap();
        assert_eq!(user.primary, 100);
        assert!(store.user(UserId(42)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_user_status_is_not_found() {
        let (_, _, engine) = engine();
        let err = engine.user_status(UserId(5)).await.unwrap_err();
        assert!(matches!(err, EngineError::EntityNotFound { entity: "user", .. }));

        engine.admit(UserId(5)).await.unwrap();
        let status = engine.user_status(UserId(5)).await.unwrap();
        assert_eq!(status.risk, RiskLevel::Low);
    }
}
