//! Soil pH: diagnosis, sampling drift and paid remediation.

use peatnet_types::{
    Chat, ChatId, ChatPatch, Currency, MiningAction, MiningEvent, PH_MAX, PH_MIN, PhBand,
    RemediationAction, UserId, UserPatch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EnvironmentConfig, PhRange};
use crate::context::Context;
use crate::dice::Dice;
use crate::economy::{insufficient, signed};
use crate::error::EngineError;
use crate::store::{Commit, EntityStore};

/// A pH reading classified into a band, with the suggested remedy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// The reading.
    pub ph: f64,
    /// Its band.
    pub band: PhBand,
    /// What to do about it, if anything.
    pub hint: Option<RemediationAction>,
}

/// Classify a pH reading.
pub const fn band(ph: f64) -> PhBand {
    if ph < 4.0 {
        PhBand::CriticalAcid
    } else if ph < 5.5 {
        PhBand::Acidic
    } else if ph <= 6.5 {
        PhBand::Balanced
    } else if ph <= 7.5 {
        PhBand::Alkaline
    } else {
        PhBand::CriticalAlkaline
    }
}

/// Diagnose a chat from its stored reading. Pure.
pub const fn diagnose(chat: &Chat) -> Diagnosis {
    diagnose_ph(chat.ph_level)
}

/// Diagnose a raw pH reading.
pub const fn diagnose_ph(ph: f64) -> Diagnosis {
    let band = band(ph);
    let hint = match band {
        PhBand::CriticalAcid | PhBand::CriticalAlkaline => Some(RemediationAction::Emergency),
        PhBand::Acidic => Some(RemediationAction::Lime),
        PhBand::Balanced => None,
        PhBand::Alkaline => Some(RemediationAction::Acidify),
    };
    Diagnosis { ph, band, hint }
}

/// Round to one decimal place, as readings are displayed.
pub fn round_ph(ph: f64) -> f64 {
    (ph * 10.0).round() / 10.0
}

/// A bounded random walk step from `ph`, clamped to the physical scale.
pub fn drift(dice: &dyn Dice, ph: f64, step: f64) -> f64 {
    let shift = dice.span(PhRange::new(-step, step));
    round_ph((ph + shift).clamp(PH_MIN, PH_MAX))
}

/// Cost and new reading for a remediation, or `None` if the guard refuses.
fn plan(
    config: &EnvironmentConfig,
    dice: &dyn Dice,
    action: RemediationAction,
    ph: f64,
) -> Option<(u64, Currency, f64)> {
    let (cost, currency, next) = match action {
        RemediationAction::Lime | RemediationAction::PeatFeed => {
            let raise = if action == RemediationAction::Lime {
                &config.lime
            } else {
                &config.peat_feed
            };
            if ph >= raise.cap {
                return None;
            }
            let next = (ph + dice.span(raise.shift)).min(raise.cap);
            (raise.cost, raise.currency, next)
        }
        RemediationAction::Acidify => {
            let acidify = &config.acidify;
            if ph <= acidify.trigger {
                return None;
            }
            let next = (ph - dice.span(acidify.shift)).max(acidify.floor);
            (acidify.cost, acidify.currency, next)
        }
        RemediationAction::Emergency => {
            let emergency = &config.emergency;
            if ph >= emergency.acid_trigger && ph <= emergency.alkaline_trigger {
                return None;
            }
            (emergency.cost, emergency.currency, dice.span(emergency.target))
        }
    };
    Some((cost, currency, round_ph(next).clamp(config.floor, config.ceiling)))
}

/// Result of a remediation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    /// What was done.
    pub action: RemediationAction,
    /// Reading before.
    pub before: f64,
    /// Reading after.
    pub after: f64,
    /// Price paid.
    pub cost: u64,
    /// Currency paid in.
    pub currency: Currency,
}

/// pH sampling and remediation over the store.
pub struct Environment<S> {
    ctx: Context<S>,
}

impl<S> Clone for Environment<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: EntityStore> Environment<S> {
    /// Build the environment model over shared handles.
    pub const fn new(ctx: Context<S>) -> Self {
        Self { ctx }
    }

    /// Take a drifted reading of a chat's pH without storing it.
    pub async fn sample_ph(&self, chat: ChatId) -> Result<f64, EngineError> {
        let stored = self
            .ctx
            .store
            .chat(chat)
            .await?
            .map_or(peatnet_types::INITIAL_PH, |c| c.ph_level);
        Ok(drift(
            self.ctx.dice.as_ref(),
            stored,
            self.ctx.config.environment.drift_step,
        ))
    }

    /// Take a drifted reading and diagnose it, storing the reading when
    /// `persist` is set. The drift is drawn under the chat lock in that case.
    pub async fn diagnose_chat(&self, chat: ChatId, persist: bool) -> Result<Diagnosis, EngineError> {
        if !persist {
            return Ok(diagnose_ph(self.sample_ph(chat).await?));
        }
        let now = self.ctx.now();
        let dice = self.ctx.dice.as_ref();
        let step = self.ctx.config.environment.drift_step;
        let ph = self
            .ctx
            .store
            .transact(self.ctx.scope(now).chat(chat), |view| {
                let ph = drift(dice, view.require_chat()?.ph_level, step);
                Ok::<_, EngineError>(Commit::new(ph).chat(ChatPatch::new().ph(ph)))
            })
            .await?;
        debug!(%chat, ph, "pH sampled");
        Ok(diagnose_ph(ph))
    }

    /// Pay to push a chat's pH toward the balanced band.
    ///
    /// The eligibility guard is checked before funds, so an unnecessary
    /// remediation fails with [`EngineError::NoEffectNeeded`] and charges
    /// nothing.
    pub async fn remediate(
        &self,
        chat: ChatId,
        user: UserId,
        action: RemediationAction,
    ) -> Result<RemediationOutcome, EngineError> {
        let now = self.ctx.now();
        let config = &self.ctx.config.environment;
        let dice = self.ctx.dice.as_ref();
        let scope = self.ctx.scope(now).chat(chat).actor(user);

        let outcome = self
            .ctx
            .store
            .transact(scope, |view| {
                let before = view.require_chat()?.ph_level;
                let current = view.require_user(user)?;
                let Some((cost, currency, after)) = plan(config, dice, action, before) else {
                    return Err(EngineError::NoEffectNeeded);
                };
                let available = current.balance(currency);
                if available < cost {
                    return Err(insufficient(currency, cost, available));
                }
                Ok(Commit::new(RemediationOutcome {
                    action,
                    before,
                    after,
                    cost,
                    currency,
                })
                .user(user, UserPatch::new().debit(currency, cost))
                .chat(ChatPatch::new().ph(after))
                .log(MiningEvent::new(
                    user,
                    MiningAction::Remediation,
                    signed(cost).saturating_neg(),
                    now,
                )))
            })
            .await?;

        info!(
            %chat,
            %user,
            action = action.as_str(),
            before = outcome.before,
            after = outcome.after,
            "pH remediated"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use peatnet_types::User;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::dice::ScriptedDice;
    use crate::events::EventBus;
    use crate::memory::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, Arc<ScriptedDice>, Environment<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dice = Arc::new(ScriptedDice::new(3));
        let ctx = Context::new(
            Arc::clone(&store),
            Arc::new(ManualClock::new(Utc::now())),
            Arc::clone(&dice) as Arc<dyn Dice>,
            EventBus::new(),
            Arc::new(EngineConfig::default()),
        );
        (store, dice, Environment::new(ctx))
    }

    async fn chat_at(store: &MemoryStore, ph: f64) {
        let mut chat = Chat::new(ChatId(1));
        chat.ph_level = ph;
        store.put_chat(chat).await;
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(band(3.9), PhBand::CriticalAcid);
        assert_eq!(band(4.0), PhBand::Acidic);
        assert_eq!(band(5.5), PhBand::Balanced);
        assert_eq!(band(6.5), PhBand::Balanced);
        assert_eq!(band(7.5), PhBand::Alkaline);
        assert_eq!(band(7.6), PhBand::CriticalAlkaline);
        assert_eq!(diagnose(&Chat::new(ChatId(1))).hint, Some(RemediationAction::Lime));
    }

    #[test]
    fn drift_stays_on_scale() {
        let dice = ScriptedDice::new(1);
        dice.push_spans([-0.5, 0.5]);
        assert!((drift(&dice, 0.2, 0.5) - 0.0).abs() < f64::EPSILON);
        assert!((drift(&dice, 13.8, 0.5) - 14.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn lime_raises_and_charges() {
        let (store, dice, env) = setup();
        chat_at(&store, 5.0).await;
        let mut user = User::new(UserId(1), Utc::now());
        user.premium = 2;
        store.put_user(user).await;
        dice.push_spans([0.8]);

        let outcome = env
            .remediate(ChatId(1), UserId(1), RemediationAction::Lime)
            .await
            .unwrap();
        assert!((outcome.after - 5.8).abs() < 1e-9);
        let user = store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.premium, 0);
    }

    #[tokio::test]
    async fn guard_refuses_without_charging() {
        let (store, _, env) = setup();
        chat_at(&store, 6.0).await;
        let err = env
            .remediate(ChatId(1), UserId(1), RemediationAction::Acidify)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoEffectNeeded));
        let user = store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.premium, 5);
        assert!(store.mining_log().is_empty());
    }

    #[tokio::test]
    async fn acidify_respects_floor() {
        let (store, dice, env) = setup();
        chat_at(&store, 6.6).await;
        dice.push_spans([0.5]);
        let outcome = env
            .remediate(ChatId(1), UserId(1), RemediationAction::Acidify)
            .await
            .unwrap();
        assert!((outcome.after - 6.1).abs() < 1e-9);

        chat_at(&store, 6.7).await;
        let outcome = env
            .remediate(ChatId(1), UserId(1), RemediationAction::Acidify)
            .await;
        assert!(matches!(
            outcome,
            Err(EngineError::InsufficientFunds { currency: Currency::Premium, .. })
        ));
    }

    #[tokio::test]
    async fn emergency_only_for_critical_readings() {
        let (store, dice, env) = setup();
        let mut user = User::new(UserId(1), Utc::now());
        user.premium = 30;
        store.put_user(user).await;

        chat_at(&store, 5.0).await;
        assert!(matches!(
            env.remediate(ChatId(1), UserId(1), RemediationAction::Emergency).await,
            Err(EngineError::NoEffectNeeded)
        ));

        chat_at(&store, 9.1).await;
        dice.push_spans([6.04]);
        let outcome = env
            .remediate(ChatId(1), UserId(1), RemediationAction::Emergency)
            .await
            .unwrap();
        assert!((outcome.after - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn lime_from_deep_acid_is_soft_clamped() {
        let (store, dice, env) = setup();
        chat_at(&store, 2.0).await;
        dice.push_spans([0.3]);
        let outcome = env
            .remediate(ChatId(1), UserId(1), RemediationAction::Lime)
            .await
            .unwrap();
        assert!((outcome.after - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn persisted_diagnosis_updates_chat() {
        let (store, dice, env) = setup();
        chat_at(&store, 6.0).await;
        dice.push_spans([0.4]);
        let diagnosis = env.diagnose_chat(ChatId(1), true).await.unwrap();
        assert!((diagnosis.ph - 6.4).abs() < 1e-9);
        assert_eq!(diagnosis.band, PhBand::Balanced);
        let chat = store.chat(ChatId(1)).await.unwrap().unwrap();
        assert!((chat.ph_level - 6.4).abs() < 1e-9);

        dice.push_spans([0.5]);
        let sampled = env.diagnose_chat(ChatId(1), false).await.unwrap();
        assert!((sampled.ph - 6.9).abs() < 1e-9);
        let chat = store.chat(ChatId(1)).await.unwrap().unwrap();
        assert!((chat.ph_level - 6.4).abs() < 1e-9);
    }
}
