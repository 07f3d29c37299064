//! Group defense against turtle swarms and CO2 releases.

use peatnet_types::{
    ChatId, ChatPatch, Currency, EngineEvent, HazardKind, MiningAction, MiningEvent, UserId,
    UserPatch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::Context;
use crate::economy::{insufficient, signed};
use crate::error::{EngineError, StoreError};
use crate::hazard::HazardTable;
use crate::store::{Commit, EntityStore};

/// Result of joining a turtle defense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// Counted; quorum not reached yet.
    Joined {
        /// Defenders so far.
        count: usize,
        /// Defenders required.
        needed: usize,
    },
    /// The user had already joined; nothing changed.
    AlreadyJoined {
        /// Defenders so far.
        count: usize,
        /// Defenders required.
        needed: usize,
    },
    /// This join completed the quorum and the swarm is resolved.
    Resolved {
        /// Everyone rewarded, ascending.
        participants: Vec<UserId>,
        /// Primary credited to each.
        reward: u64,
    },
}

/// Result of countering a CO2 release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterOutcome {
    /// Price paid.
    pub cost: u64,
    /// Currency paid in.
    pub currency: Currency,
    /// Primary reward.
    pub reward: u64,
    /// Primary balance afterwards.
    pub primary: u64,
    /// Premium balance afterwards.
    pub premium: u64,
}

/// Resolves hazards on behalf of chat members.
pub struct DefenseCoordinator<S> {
    ctx: Context<S>,
    hazards: HazardTable,
}

impl<S> Clone for DefenseCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            hazards: self.hazards.clone(),
        }
    }
}

impl<S: EntityStore> DefenseCoordinator<S> {
    /// Coordinator over the scheduler's swarm table.
    pub const fn new(ctx: Context<S>, hazards: HazardTable) -> Self {
        Self { ctx, hazards }
    }

    /// Join the defense against the chat's forming turtle swarm.
    ///
    /// Joining twice is harmless. The join that reaches quorum rewards every
    /// defender, clears the chat's turtle flag and marks the swarm resolved,
    /// which also disarms its pending damage tick. If that
    /// payout fails the joiner is taken off the roster again so a retry can
    /// complete it.
    pub async fn join(&self, chat: ChatId, user: UserId) -> Result<JoinOutcome, EngineError> {
        let needed = self.ctx.config.defense.quorum;
        let slot = self.hazards.slot(chat);
        let mut current = slot.lock().await;
        let Some(hazard) = current.as_mut().filter(|h| h.is_active()) else {
            return Err(EngineError::NoActiveHazard);
        };

        if !hazard.participants.insert(user) {
            return Ok(JoinOutcome::AlreadyJoined {
                count: hazard.participants.len(),
                needed,
            });
        }
        let count = hazard.participants.len();
        if count < needed {
            debug!(%chat, %user, count, needed, "defender joined");
            return Ok(JoinOutcome::Joined { count, needed });
        }

        let now = self.ctx.now();
        let reward = self.ctx.dice.between(self.ctx.config.defense.turtle_reward);
        let participants: Vec<UserId> = hazard.participants.iter().copied().collect();
        let scope = participants
            .iter()
            .fold(self.ctx.scope(now).chat(chat), |scope, id| scope.actor(*id));
        let paid = self
            .ctx
            .store
            .transact(scope, |_| {
                let commit = participants.iter().fold(
                    Commit::new(()).chat(ChatPatch::new().turtles(false)),
                    |commit, id| {
                        commit
                            .user(*id, UserPatch::new().credit(Currency::Primary, reward))
                            .log(MiningEvent::new(
                                *id,
                                MiningAction::TurtleDefense,
                                signed(reward),
                                now,
                            ))
                    },
                );
                Ok::<_, EngineError>(commit)
            })
            .await;
        if let Err(err) = paid {
            hazard.participants.remove(&user);
            return Err(err);
        }

        let generation = hazard.generation;
        hazard.resolve();
        drop(current);

        info!(%chat, generation, defenders = participants.len(), reward, "turtle swarm repelled");
        self.ctx.events.publish(EngineEvent::HazardResolved {
            chat_id: chat,
            kind: HazardKind::Turtles,
            participants: participants.clone(),
            reward,
            at: now,
        });
        Ok(JoinOutcome::Resolved {
            participants,
            reward,
        })
    }

    /// Pay to neutralise the chat's CO2 release, earning a primary reward.
    pub async fn counter_co2(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<CounterOutcome, EngineError> {
        let now = self.ctx.now();
        let defense = &self.ctx.config.defense;
        let dice = self.ctx.dice.as_ref();
        let scope = self.ctx.scope(now).chat(chat).actor(user);

        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let current = view.require_user(user)?;
                let (cost, currency) = (defense.co2_counter_cost, defense.co2_counter_currency);
                let available = current.balance(currency);
                if available < cost {
                    return Err(insufficient(currency, cost, available));
                }
                if !view.require_chat()?.co2_active {
                    return Err(EngineError::NoActiveHazard);
                }
                let reward = dice.between(defense.co2_reward);
                let patch = UserPatch::new()
                    .debit(currency, cost)
                    .credit(Currency::Primary, reward);
                let next = patch.apply(current).map_err(StoreError::from)?;
                Ok(Commit::new(CounterOutcome {
                    cost,
                    currency,
                    reward,
                    primary: next.primary,
                    premium: next.premium,
                })
                .user(user, patch)
                .chat(ChatPatch::new().co2(false))
                .log(MiningEvent::new(
                    user,
                    MiningAction::Co2Defense,
                    signed(reward),
                    now,
                )))
            })
            .await?;

        info!(%chat, %user, reward = outcome.reward, "CO2 release countered");
        self.ctx.events.publish(EngineEvent::HazardResolved {
            chat_id: chat,
            kind: HazardKind::Co2,
            participants: vec![user],
            reward: outcome.reward,
            at: now,
        });
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use peatnet_types::{Chat, DefenseState, User};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::dice::{Dice, ScriptedDice};
    use crate::events::EventBus;
    use crate::hazard::ActiveHazard;
    use crate::memory::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        dice: Arc<ScriptedDice>,
        hazards: HazardTable,
        defense: DefenseCoordinator<MemoryStore>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dice = Arc::new(ScriptedDice::new(5));
        let hazards = HazardTable::new();
        let ctx = Context::new(
            Arc::clone(&store),
            Arc::new(ManualClock::new(Utc::now())),
            Arc::clone(&dice) as Arc<dyn Dice>,
            EventBus::new(),
            Arc::new(EngineConfig::default()),
        );
        Harness {
            store,
            dice,
            hazards: hazards.clone(),
            defense: DefenseCoordinator::new(ctx, hazards),
        }
    }

    async fn swarm(h: &Harness, chat: ChatId) {
        let mut record = Chat::new(chat);
        record.turtle_active = true;
        h.store.put_chat(record).await;
        *h.hazards.slot(chat).lock().await =
            Some(ActiveHazard::forming(HazardKind::Turtles, 1, Utc::now(), 5));
    }

    #[test]
    fn join_outcomes_are_tagged() {
        let json = serde_json::to_value(JoinOutcome::Joined { count: 2, needed: 5 }).unwrap();
        assert_eq!(json["status"], "joined");
        assert_eq!(json["needed"], 5);
    }

    #[tokio::test]
    async fn joining_without_swarm_is_refused() {
        let h = harness();
        let err = h.defense.join(ChatId(1), UserId(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::NoActiveHazard));
    }

    #[tokio::test]
    async fn double_join_counts_once() {
        let h = harness();
        swarm(&h, ChatId(1)).await;
        let first = h.defense.join(ChatId(1), UserId(1)).await.unwrap();
        let again = h.defense.join(ChatId(1), UserId(1)).await.unwrap();
        assert_eq!(first, JoinOutcome::Joined { count: 1, needed: 5 });
        assert_eq!(again, JoinOutcome::AlreadyJoined { count: 1, needed: 5 });
    }

    #[tokio::test]
    async fn quorum_rewards_everyone_and_clears_swarm() {
        let h = harness();
        let chat = ChatId(1);
        swarm(&h, chat).await;
        h.dice.push_amounts([12]);
        for id in 1..=4 {
            let outcome = h.defense.join(chat, UserId(id)).await.unwrap();
            assert!(matches!(outcome, JoinOutcome::Joined { .. }));
        }
        let done = h.defense.join(chat, UserId(5)).await.unwrap();
        assert_eq!(
            done,
            JoinOutcome::Resolved {
                participants: (1..=5).map(UserId).collect(),
                reward: 12,
            }
        );
        for id in 1..=5 {
            let user = h.store.user(UserId(id)).await.unwrap().unwrap();
            assert_eq!(user.primary, 112);
        }
        assert!(!h.store.chat(chat).await.unwrap().unwrap().turtle_active);
        let repelled = h.hazards.snapshot(chat).await.unwrap();
        assert_eq!(repelled.state, DefenseState::Resolved);
        assert_eq!(repelled.participants.len(), 5);
        assert!(matches!(
            h.defense.join(chat, UserId(6)).await,
            Err(EngineError::NoActiveHazard)
        ));
    }

    #[tokio::test]
    async fn failed_payout_leaves_roster_unchanged() {
        let h = harness();
        let chat = ChatId(1);
        swarm(&h, chat).await;
        for id in 1..=4 {
            h.defense.join(chat, UserId(id)).await.unwrap();
        }
        h.store.set_unavailable(true);
        assert!(h.defense.join(chat, UserId(5)).await.is_err());
        h.store.set_unavailable(false);

        let swarm = h.hazards.snapshot(chat).await.unwrap();
        assert_eq!(swarm.participants.len(), 4);
        let retried = h.defense.join(chat, UserId(5)).await.unwrap();
        assert!(matches!(retried, JoinOutcome::Resolved { .. }));
    }

    #[tokio::test]
    async fn counter_co2_checks_funds_then_flag() {
        let h = harness();
        let chat = ChatId(1);
        let mut poor = User::new(UserId(1), Utc::now());
        poor.premium = 2;
        h.store.put_user(poor).await;
        assert!(matches!(
            h.defense.counter_co2(chat, UserId(1)).await,
            Err(EngineError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            h.defense.counter_co2(chat, UserId(2)).await,
            Err(EngineError::NoActiveHazard)
        ));

        let mut record = Chat::new(chat);
        record.co2_active = true;
        h.store.put_chat(record).await;
        h.dice.push_amounts([30]);
        let outcome = h.defense.counter_co2(chat, UserId(2)).await.unwrap();
        assert_eq!(outcome.premium, 2);
        assert_eq!(outcome.primary, 130);
        assert!(!h.store.chat(chat).await.unwrap().unwrap().co2_active);
    }
}
