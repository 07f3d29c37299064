//! The danger scheduler.
//!
//! Each firing visits every known chat and spawns one uniformly chosen
//! hazard there:
//!
//! - **CO2**: raises the chat's `co2_active` flag until someone counters it.
//! - **Turtles**: installs a forming swarm in the [`HazardTable`] and
//!   schedules a delayed damage tick stamped with the swarm's generation.
//! - **Perforation**: one random chat member who is not serving a ban loses
//!   health and gains a perforation.
//!
//! A failure in one chat is logged and the firing moves on to the next.

use std::time::Duration;

use peatnet_types::{
    ChatId, ChatPatch, Currency, DamageLoss, EngineEvent, HazardCause, HazardKind, MiningAction,
    MiningEvent, UserId, UserPatch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::economy::signed;
use crate::error::EngineError;
use crate::hazard::{ActiveHazard, HazardTable};
use crate::store::{Commit, EntityStore};

/// Summary of one scheduler firing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringReport {
    /// Chats visited.
    pub chats: usize,
    /// Hazards spawned.
    pub fired: usize,
    /// Chats whose hazard failed to spawn.
    pub failures: usize,
}

/// Spawns hazards and owns the swarm table.
pub struct DangerScheduler<S> {
    ctx: Context<S>,
    hazards: HazardTable,
}

impl<S> Clone for DangerScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            hazards: self.hazards.clone(),
        }
    }
}

impl<S: EntityStore> DangerScheduler<S> {
    /// A scheduler with an empty swarm table.
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            hazards: HazardTable::new(),
        }
    }

    /// Handle to the swarm table, for the defense coordinator.
    pub fn hazards(&self) -> HazardTable {
        self.hazards.clone()
    }

    /// Fire once in every known chat.
    ///
    /// # Errors
    ///
    /// Only listing chats can fail; per-chat failures are logged and counted.
    pub async fn fire_all(&self) -> Result<FiringReport, EngineError> {
        let chats = self.ctx.store.chat_ids().await?;
        let mut report = FiringReport {
            chats: chats.len(),
            ..FiringReport::default()
        };
        for chat in chats {
            match self.fire(chat).await {
                Ok(_) => report.fired = report.fired.saturating_add(1),
                Err(err) => {
                    report.failures = report.failures.saturating_add(1);
                    warn!(%chat, error = %err, "hazard spawn failed");
                }
            }
        }
        info!(
            chats = report.chats,
            fired = report.fired,
            failures = report.failures,
            "danger scheduler fired"
        );
        Ok(report)
    }

    /// Spawn one uniformly chosen hazard in `chat`.
    pub async fn fire(&self, chat: ChatId) -> Result<HazardKind, EngineError> {
        let index = self.ctx.dice.pick(HazardKind::SCHEDULED.len());
        let kind = HazardKind::SCHEDULED
            .get(index)
            .copied()
            .unwrap_or(HazardKind::Co2);
        self.fire_kind(chat, kind).await?;
        Ok(kind)
    }

    /// Spawn a specific hazard in `chat`.
    pub async fn fire_kind(&self, chat: ChatId, kind: HazardKind) -> Result<(), EngineError> {
        match kind {
            HazardKind::Co2 => self.spawn_co2(chat).await,
            HazardKind::Turtles => self.spawn_turtles(chat).await,
            HazardKind::Perforation => self.perforate(chat).await,
        }
    }

    async fn spawn_co2(&self, chat: ChatId) -> Result<(), EngineError> {
        let now = self.ctx.now();
        self.ctx
            .store
            .transact(self.ctx.scope(now).chat(chat), |_| {
                Ok::<_, EngineError>(
                    Commit::new(()).chat(ChatPatch::new().co2(true).danger(now, HazardKind::Co2)),
                )
            })
            .await?;

        info!(%chat, "CO2 release spawned");
        self.ctx.events.publish(EngineEvent::HazardSpawned {
            chat_id: chat,
            kind: HazardKind::Co2,
            cause: HazardCause::Scheduler,
            severity: None,
            generation: None,
            at: now,
        });
        Ok(())
    }

    async fn spawn_turtles(&self, chat: ChatId) -> Result<(), EngineError> {
        let now = self.ctx.now();
        let dangers = &self.ctx.config.dangers;
        let slot = self.hazards.slot(chat);
        let mut current = slot.lock().await;

        let severity = u32::try_from(self.ctx.dice.between(dangers.turtle_count)).unwrap_or(u32::MAX);
        let generation = self.hazards.next_generation();
        self.ctx
            .store
            .transact(self.ctx.scope(now).chat(chat), |_| {
                Ok::<_, EngineError>(Commit::new(()).chat(
                    ChatPatch::new()
                        .turtles(true)
                        .danger(now, HazardKind::Turtles),
                ))
            })
            .await?;

        let expired = current.take().and_then(ActiveHazard::into_expired);
        *current = Some(ActiveHazard::forming(
            HazardKind::Turtles,
            generation,
            now,
            severity,
        ));
        drop(current);

        if let Some(old) = expired {
            info!(%chat, generation = old.generation, "unresolved turtle swarm replaced");
            self.ctx.events.publish(EngineEvent::HazardExpired {
                chat_id: chat,
                kind: old.kind,
                generation: old.generation,
                participants: old.participants.len(),
                at: now,
            });
        }

        info!(%chat, generation, severity, "turtle swarm spawned");
        self.ctx.events.publish(EngineEvent::HazardSpawned {
            chat_id: chat,
            kind: HazardKind::Turtles,
            cause: HazardCause::Scheduler,
            severity: Some(severity),
            generation: Some(generation),
            at: now,
        });

        let delay = Duration::from_secs(dangers.turtle_damage_delay_secs);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.damage_tick(chat, generation).await;
        });
        Ok(())
    }

    /// Apply turtle damage for the swarm stamped `generation`.
    ///
    /// Does nothing if that swarm was resolved or replaced in the meantime.
    /// The swarm stays in place afterwards; damage never resolves it.
    pub async fn damage_tick(&self, chat: ChatId, generation: u64) -> Vec<DamageLoss> {
        let slot = self.hazards.slot(chat);
        let current = slot.lock().await;
        if !current.as_ref().is_some_and(|h| h.is_forming(generation)) {
            debug!(%chat, generation, "stale damage tick ignored");
            return Vec::new();
        }

        let members = match self.ctx.store.chat_members(chat).await {
            Ok(members) => members,
            Err(err) => {
                warn!(%chat, generation, error = %err, "damage tick could not list members");
                return Vec::new();
            }
        };

        let mut losses = Vec::new();
        for member in members {
            match self.bite(member).await {
                Ok(0) => {}
                Ok(amount) => losses.push(DamageLoss {
                    user_id: member,
                    amount,
                }),
                Err(err) => warn!(%chat, user = %member, error = %err, "turtle damage failed"),
            }
        }
        drop(current);

        info!(%chat, generation, bitten = losses.len(), "turtle damage applied");
        self.ctx.events.publish(EngineEvent::HazardDamageApplied {
            chat_id: chat,
            generation,
            losses: losses.clone(),
            at: self.ctx.now(),
        });
        losses
    }

    async fn bite(&self, user: UserId) -> Result<u64, EngineError> {
        let now = self.ctx.now();
        let damage = self.ctx.config.dangers.turtle_damage;
        self.ctx
            .store
            .transact(self.ctx.scope(now).existing(user), |view| {
                let Some(current) = view.user(user) else {
                    return Ok::<_, EngineError>(Commit::new(0));
                };
                let amount = damage.min(current.primary);
                if amount == 0 {
                    return Ok(Commit::new(0));
                }
                Ok(Commit::new(amount)
                    .user(user, UserPatch::new().debit(Currency::Primary, amount))
                    .log(MiningEvent::new(
                        user,
                        MiningAction::TurtleDamage,
                        signed(amount).saturating_neg(),
                        now,
                    )))
            })
            .await
    }

    async fn perforate(&self, chat: ChatId) -> Result<(), EngineError> {
        let now = self.ctx.now();
        let members = self.ctx.store.chat_members(chat).await?;
        let dice = self.ctx.dice.as_ref();
        let loss_range = self.ctx.config.dangers.perforation_health_loss;

        let scope = members
            .iter()
            .fold(self.ctx.scope(now).chat(chat), |scope, id| scope.existing(*id));
        let victim = self
            .ctx
            .store
            .transact(scope, |view| {
                let marked = ChatPatch::new().danger(now, HazardKind::Perforation);
                let candidates: Vec<UserId> = view
                    .users()
                    .filter(|u| u.ban_active(now).is_none())
                    .map(|u| u.id)
                    .collect();
                let Some(&id) = candidates.get(dice.pick(candidates.len())) else {
                    return Ok::<_, EngineError>(Commit::new(None).chat(marked));
                };
                let current = view.require_user(id)?;
                let rolled = u32::try_from(dice.between(loss_range)).unwrap_or(u32::MAX);
                let loss = rolled.min(current.health);
                Ok(Commit::new(Some((id, loss)))
                    .user(
                        id,
                        UserPatch::new()
                            .adjust_health(i64::from(loss).saturating_neg())
                            .perforate(),
                    )
                    .chat(marked))
            })
            .await?;

        match victim {
            Some((user, health_loss)) => {
                info!(%chat, %user, health_loss, "member perforated");
                self.ctx.events.publish(EngineEvent::PerforationInflicted {
                    chat_id: chat,
                    user_id: user,
                    health_loss,
                    at: now,
                });
            }
            None => debug!(%chat, "perforation found nobody to hit"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeDelta, Utc};
    use peatnet_types::{Chat, DefenseState, User};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::defense::DefenseCoordinator;
    use crate::dice::{Dice, ScriptedDice};
    use crate::events::EventBus;
    use crate::memory::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        dice: Arc<ScriptedDice>,
        events: EventBus,
        scheduler: DangerScheduler<MemoryStore>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dice = Arc::new(ScriptedDice::new(11));
        let events = EventBus::new();
        let ctx = Context::new(
            Arc::clone(&store),
            Arc::new(ManualClock::new(Utc::now())),
            Arc::clone(&dice) as Arc<dyn Dice>,
            events.clone(),
            Arc::new(EngineConfig::default()),
        );
        Harness {
            store,
            dice,
            events,
            scheduler: DangerScheduler::new(ctx),
        }
    }

    async fn member(store: &MemoryStore, chat: ChatId, id: i64, primary: u64) -> UserId {
        let mut user = User::new(UserId(id), Utc::now());
        user.primary = primary;
        store.put_user(user).await;
        store.add_member(chat, UserId(id));
        UserId(id)
    }

    #[tokio::test]
    async fn co2_sets_flag_and_danger() {
        let h = harness();
        h.dice.push_picks([0]);
        let kind = h.scheduler.fire(ChatId(1)).await.unwrap();
        assert_eq!(kind, HazardKind::Co2);
        let chat = h.store.chat(ChatId(1)).await.unwrap().unwrap();
        assert!(chat.co2_active);
        assert_eq!(chat.danger_type, Some(HazardKind::Co2));
        assert!(chat.last_danger_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn turtle_damage_lands_once_after_delay() {
        let h = harness();
        let chat = ChatId(1);
        member(&h.store, chat, 1, 100).await;
        member(&h.store, chat, 2, 4).await;
        member(&h.store, chat, 3, 0).await;
        let mut rx = h.events.subscribe();

        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();
        assert!(h.store.chat(chat).await.unwrap().unwrap().turtle_active);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(h.store.user(UserId(1)).await.unwrap().unwrap().primary, 100);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.store.user(UserId(1)).await.unwrap().unwrap().primary, 90);
        assert_eq!(h.store.user(UserId(2)).await.unwrap().unwrap().primary, 0);
        assert_eq!(h.store.user(UserId(3)).await.unwrap().unwrap().primary, 0);

        let spawned = rx.recv().await.unwrap();
        assert_eq!(spawned.kind(), "hazard_spawned");
        let damage = rx.recv().await.unwrap();
        assert!(matches!(
            damage,
            EngineEvent::HazardDamageApplied { ref losses, .. } if losses.len() == 2
        ));

        let swarm = h.scheduler.hazards().snapshot(chat).await.unwrap();
        assert_eq!(swarm.state, DefenseState::Forming);
    }

    #[tokio::test]
    async fn stale_tick_is_a_no_op() {
        let h = harness();
        let chat = ChatId(1);
        member(&h.store, chat, 1, 100).await;
        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();
        let first = h.scheduler.hazards().snapshot(chat).await.unwrap().generation;

        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();
        assert!(h.scheduler.damage_tick(chat, first).await.is_empty());
        assert_eq!(h.store.user(UserId(1)).await.unwrap().unwrap().primary, 100);
    }

    #[tokio::test]
    async fn overwrite_expires_forming_swarm() {
        let h = harness();
        let chat = ChatId(1);
        let mut rx = h.events.subscribe();
        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();
        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["hazard_spawned", "hazard_expired", "hazard_spawned"]);
    }

    #[tokio::test]
    async fn perforation_skips_banned_members() {
        let h = harness();
        let chat = ChatId(1);
        let mut banned = User::new(UserId(1), Utc::now());
        banned.is_banned = true;
        banned.banned_until = Some(Utc::now() + TimeDelta::hours(3));
        h.store.put_user(banned).await;
        h.store.add_member(chat, UserId(1));
        member(&h.store, chat, 2, 100).await;

        h.dice.push_picks([0]);
        h.dice.push_amounts([35]);
        h.scheduler.fire_kind(chat, HazardKind::Perforation).await.unwrap();

        let victim = h.store.user(UserId(2)).await.unwrap().unwrap();
        assert_eq!(victim.health, 65);
        assert_eq!(victim.perforation_count, 1);
        let spared = h.store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(spared.perforation_count, 0);
    }

    #[tokio::test]
    async fn perforation_in_empty_chat_only_marks_danger() {
        let h = harness();
        h.scheduler
            .fire_kind(ChatId(9), HazardKind::Perforation)
            .await
            .unwrap();
        let chat = h.store.chat(ChatId(9)).await.unwrap().unwrap();
        assert_eq!(chat.danger_type, Some(HazardKind::Perforation));
    }

    #[tokio::test]
    async fn one_failing_chat_does_not_stop_the_others() {
        let h = harness();
        h.store.put_chat(Chat::new(ChatId(1))).await;
        h.store.put_chat(Chat::new(ChatId(2))).await;
        h.store.put_chat(Chat::new(ChatId(3))).await;
        h.store.set_chat_unavailable(ChatId(2), true);
        h.dice.push_picks([0, 0, 0]);

        let report = h.scheduler.fire_all().await.unwrap();
        assert_eq!(report, FiringReport { chats: 3, fired: 2, failures: 1 });
        for id in [1, 3] {
            assert!(h.store.chat(ChatId(id)).await.unwrap().unwrap().co2_active);
        }
        let skipped = h.store.chat(ChatId(2)).await.unwrap().unwrap();
        assert!(!skipped.co2_active);
        assert!(skipped.last_danger_at.is_none());

        h.store.set_unavailable(true);
        assert!(h.scheduler.fire_all().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn damage_tick_after_quorum_is_a_no_op() {
        let h = harness();
        let chat = ChatId(1);
        for id in 10..15 {
            member(&h.store, chat, id, 100).await;
        }
        let defense = DefenseCoordinator::new(h.scheduler.ctx.clone(), h.scheduler.hazards());
        h.dice.push_amounts([5, 10]);
        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();
        let generation = h.scheduler.hazards().snapshot(chat).await.unwrap().generation;
        let mut rx = h.events.subscribe();

        for id in 10..15 {
            defense.join(chat, UserId(id)).await.unwrap();
        }
        let swarm = h.scheduler.hazards().snapshot(chat).await.unwrap();
        assert_eq!(swarm.state, DefenseState::Resolved);

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(h.scheduler.damage_tick(chat, generation).await.is_empty());
        for id in 10..15 {
            assert_eq!(h.store.user(UserId(id)).await.unwrap().unwrap().primary, 110);
        }
        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["hazard_resolved"]);
    }

    #[tokio::test]
    async fn spawn_after_quorum_expires_nothing() {
        let h = harness();
        let chat = ChatId(1);
        let defense = DefenseCoordinator::new(h.scheduler.ctx.clone(), h.scheduler.hazards());
        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();
        for id in 1..=5 {
            defense.join(chat, UserId(id)).await.unwrap();
        }
        let mut rx = h.events.subscribe();
        h.scheduler.fire_kind(chat, HazardKind::Turtles).await.unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["hazard_spawned"]);
        let swarm = h.scheduler.hazards().snapshot(chat).await.unwrap();
        assert_eq!(swarm.state, DefenseState::Forming);
        assert!(swarm.participants.is_empty());
    }
}
