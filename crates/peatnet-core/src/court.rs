//! The three courts.
//!
//! Filing debits the plaintiff's fee at once and puts the case on the
//! docket as deliberating. A spawned task sleeps through the court's
//! deliberation time without holding any lock, then draws the verdict and
//! applies the sentence in a single transaction over plaintiff and
//! defendant. The docket can be queried at any point; once a case leaves
//! the in-memory docket its record is still readable from the store.
//!
//! | Court | Verdicts | Sentence |
//! |-------|----------|----------|
//! | selezenka | guilty, warning, not guilty (uniform) | fine moved to the plaintiff |
//! | redodendron | guilty 70% | fine burned, plaintiff gets bonus premium |
//! | kishka | banished 50% | 24 h ban, warnings reset, health set, primary confiscated up to a cap |
//!
//! A guilty defendant who cannot pay the fine gets a warning instead.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use peatnet_types::{
    CaseId, CourtCase, CourtType, Currency, EngineEvent, MiningAction, MiningEvent, User, UserId,
    UserPatch, Verdict, WARNING_LIMIT,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{CourtConfig, secs};
use crate::context::Context;
use crate::dice::Dice;
use crate::economy::{insufficient, signed};
use crate::error::EngineError;
use crate::store::{Commit, EntityStore, TxView};

// ---------------------------------------------------------------------------
// Docket
// ---------------------------------------------------------------------------

/// Where a case stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseStatus {
    /// The court is deliberating.
    Deliberating {
        /// When the verdict is due.
        decide_at: DateTime<Utc>,
    },
    /// The verdict is in and recorded.
    Decided {
        /// The recorded case.
        case: CourtCase,
    },
    /// The verdict could not be recorded.
    Aborted {
        /// What went wrong.
        reason: String,
    },
}

impl CaseStatus {
    const fn is_finished(&self) -> bool {
        !matches!(self, Self::Deliberating { .. })
    }
}

/// Bounded in-memory record of recent cases.
///
/// When the docket is over capacity the oldest finished cases are dropped
/// first. Deliberating cases are never dropped.
#[derive(Debug)]
struct Docket {
    inner: Mutex<DocketInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct DocketInner {
    cases: BTreeMap<CaseId, CaseStatus>,
    order: VecDeque<CaseId>,
}

impl Docket {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(DocketInner::default()),
            capacity,
        }
    }

    fn inner(&self) -> MutexGuard<'_, DocketInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, id: CaseId, status: CaseStatus) {
        let mut inner = self.inner();
        if inner.cases.insert(id, status).is_none() {
            inner.order.push_back(id);
        }
        let excess = inner.cases.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        let evict: BTreeSet<CaseId> = inner
            .order
            .iter()
            .filter(|id| inner.cases.get(*id).is_some_and(CaseStatus::is_finished))
            .take(excess)
            .copied()
            .collect();
        inner.cases.retain(|id, _| !evict.contains(id));
        inner.order.retain(|id| !evict.contains(id));
    }

    fn get(&self, id: CaseId) -> Option<CaseStatus> {
        self.inner().cases.get(&id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Filing
// ---------------------------------------------------------------------------

/// A case accepted for deliberation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    /// Case id.
    pub case_id: CaseId,
    /// Which court.
    pub court_type: CourtType,
    /// Who filed.
    pub plaintiff: UserId,
    /// Who was sued.
    pub defendant: UserId,
    /// Premium fee paid.
    pub cost: u64,
    /// When the verdict is due.
    pub decide_at: DateTime<Utc>,
}

/// What the court decided to do to the defendant.
#[derive(Debug, Clone, Copy)]
enum Penalty {
    Acquit,
    Warn,
    Fine { amount: u64, bonus: u64, to_plaintiff: bool },
    Banish,
}

fn draw_penalty(config: &CourtConfig, court: CourtType, draw: f64) -> Penalty {
    match court {
        CourtType::Selezenka => {
            let guilty = config.selezenka_guilty_probability;
            if draw < guilty {
                Penalty::Fine {
                    amount: config.selezenka.fine,
                    bonus: 0,
                    to_plaintiff: true,
                }
            } else if draw < guilty + config.selezenka_warning_probability {
                Penalty::Warn
            } else {
                Penalty::Acquit
            }
        }
        CourtType::Redodendron => {
            if draw < config.redodendron_guilty_probability {
                Penalty::Fine {
                    amount: config.redodendron.fine,
                    bonus: config.redodendron_bonus,
                    to_plaintiff: false,
                }
            } else {
                Penalty::Acquit
            }
        }
        CourtType::Kishka => {
            if draw < config.kishka_banish_probability {
                Penalty::Banish
            } else {
                Penalty::Acquit
            }
        }
    }
}

const fn warning_result(defendant: &User) -> &'static str {
    if defendant.warnings.saturating_add(1) >= WARNING_LIMIT {
        "warning_rollover"
    } else {
        "warning"
    }
}

/// Balance and record changes a verdict implies.
struct Sentence {
    verdict: Verdict,
    fine: u64,
    credited: u64,
    result: &'static str,
    plaintiff: UserPatch,
    defendant: UserPatch,
}

fn sentence(
    config: &CourtConfig,
    penalty: Penalty,
    defendant: &User,
    now: DateTime<Utc>,
) -> Sentence {
    let penalty = match penalty {
        Penalty::Fine { amount, .. } if defendant.primary < amount => Penalty::Warn,
        other => other,
    };
    match penalty {
        Penalty::Acquit => Sentence {
            verdict: Verdict::NotGuilty,
            fine: 0,
            credited: 0,
            result: "acquitted",
            plaintiff: UserPatch::new(),
            defendant: UserPatch::new(),
        },
        Penalty::Warn => Sentence {
            verdict: Verdict::Warning,
            fine: 0,
            credited: 0,
            result: warning_result(defendant),
            plaintiff: UserPatch::new(),
            defendant: UserPatch::new().warn(config.warning_health_loss),
        },
        Penalty::Fine {
            amount,
            bonus,
            to_plaintiff,
        } => Sentence {
            verdict: Verdict::Guilty,
            fine: amount,
            credited: if to_plaintiff { amount } else { 0 },
            result: if to_plaintiff { "fined" } else { "fined_with_bonus" },
            plaintiff: if to_plaintiff {
                UserPatch::new().credit(Currency::Primary, amount)
            } else {
                UserPatch::new().credit(Currency::Premium, bonus)
            },
            defendant: UserPatch::new().debit(Currency::Primary, amount),
        },
        Penalty::Banish => {
            let confiscated = defendant.primary.min(config.kishka.fine);
            let until = now
                .checked_add_signed(secs(config.kishka_ban_secs))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            Sentence {
                verdict: Verdict::Banished,
                fine: confiscated,
                credited: confiscated,
                result: "banished",
                plaintiff: UserPatch::new().credit(Currency::Primary, confiscated),
                defendant: UserPatch::new()
                    .ban_until(until)
                    .reset_warnings()
                    .set_health(config.kishka_health)
                    .debit(Currency::Primary, confiscated),
            }
        }
    }
}

/// Draw the verdict for `filing` and build the sentence against the locked
/// rows.
fn judge(
    config: &CourtConfig,
    dice: &dyn Dice,
    filing: &Filing,
    view: &TxView,
    now: DateTime<Utc>,
) -> Result<Commit<CourtCase>, EngineError> {
    view.require_user(filing.plaintiff)?;
    let defendant = view.require_user(filing.defendant)?;
    let penalty = draw_penalty(config, filing.court_type, dice.unit());
    let Sentence {
        verdict,
        fine,
        credited,
        result,
        plaintiff: plaintiff_patch,
        defendant: defendant_patch,
    } = sentence(config, penalty, defendant, now);

    let case = CourtCase {
        id: filing.case_id,
        plaintiff: filing.plaintiff,
        defendant: filing.defendant,
        court_type: filing.court_type,
        verdict,
        fine,
        result: result.to_owned(),
        decided_at: now,
    };
    let mut commit = Commit::new(case.clone())
        .user(filing.plaintiff, plaintiff_patch)
        .user(filing.defendant, defendant_patch)
        .case(case);
    if credited > 0 {
        commit = commit.log(MiningEvent::new(
            filing.plaintiff,
            MiningAction::CourtFee,
            signed(credited),
            now,
        ));
    }
    if fine > 0 {
        commit = commit.log(MiningEvent::new(
            filing.defendant,
            MiningAction::CourtFee,
            signed(fine).saturating_neg(),
            now,
        ));
    }
    Ok(commit)
}

// ---------------------------------------------------------------------------
// CourtEngine
// ---------------------------------------------------------------------------

/// Files cases and runs deliberations.
pub struct CourtEngine<S> {
    ctx: Context<S>,
    docket: Arc<Docket>,
}

impl<S> Clone for CourtEngine<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            docket: Arc::clone(&self.docket),
        }
    }
}

impl<S: EntityStore> CourtEngine<S> {
    /// A court with an empty docket.
    pub fn new(ctx: Context<S>) -> Self {
        let capacity = ctx.config.court.docket_capacity;
        Self {
            ctx,
            docket: Arc::new(Docket::new(capacity)),
        }
    }

    /// File a case. The fee is debited now and is not refunded whatever the
    /// verdict; the verdict follows after the court's deliberation time.
    pub async fn file(
        &self,
        court_type: CourtType,
        plaintiff: UserId,
        defendant: UserId,
    ) -> Result<Filing, EngineError> {
        let now = self.ctx.now();
        let terms = self.ctx.config.court.terms(court_type);
        let decide_at = now
            .checked_add_signed(TimeDelta::milliseconds(
                i64::try_from(terms.deliberation_ms).unwrap_or(i64::MAX),
            ))
            .unwrap_or(now);
        let filing = Filing {
            case_id: CaseId::new(),
            court_type,
            plaintiff,
            defendant,
            cost: terms.cost,
            decide_at,
        };
        let scope = self.ctx.scope(now).user(plaintiff).existing(defendant);

        self.ctx
            .store
            .transact(scope, |view| {
                let filer = view.require_user(plaintiff)?;
                if filer.premium < terms.cost {
                    return Err(insufficient(Currency::Premium, terms.cost, filer.premium));
                }
                if plaintiff == defendant {
                    return Err(EngineError::SelfTarget);
                }
                let accused = view.user(defendant).ok_or(EngineError::DefendantNotFound)?;
                if let Some(until) = accused.ban_active(now) {
                    return Err(EngineError::DefendantBanned { until });
                }
                Ok(Commit::new(())
                    .user(plaintiff, UserPatch::new().debit(Currency::Premium, terms.cost))
                    .log(MiningEvent::new(
                        plaintiff,
                        MiningAction::CourtFee,
                        signed(terms.cost).saturating_neg(),
                        now,
                    )))
            })
            .await?;

        self.docket
            .record(filing.case_id, CaseStatus::Deliberating { decide_at });
        info!(
            case = %filing.case_id,
            court = court_type.as_str(),
            %plaintiff,
            %defendant,
            "case filed"
        );
        self.ctx.events.publish(EngineEvent::CaseFiled {
            case_id: filing.case_id,
            court_type,
            plaintiff,
            defendant,
            decide_at,
        });

        let this = self.clone();
        let delay = Duration::from_millis(terms.deliberation_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.decide(filing).await;
        });
        Ok(filing)
    }

    async fn decide(&self, filing: Filing) {
        let now = self.ctx.now();
        let config = &self.ctx.config.court;
        let dice = self.ctx.dice.as_ref();
        let scope = self
            .ctx
            .scope(now)
            .existing(filing.plaintiff)
            .existing(filing.defendant);

        let decided = self
            .ctx
            .store
            .transact(scope, |view| judge(config, dice, &filing, view, now))
            .await;

        match decided {
            Ok(case) => {
                info!(
                    case = %case.id,
                    verdict = case.verdict.as_str(),
                    fine = case.fine,
                    "verdict reached"
                );
                self.docket.record(
                    case.id,
                    CaseStatus::Decided { case: case.clone() },
                );
                self.ctx.events.publish(EngineEvent::VerdictReached { case });
            }
            Err(err) => {
                error!(case = %filing.case_id, error = %err, "verdict could not be recorded");
                self.docket.record(
                    filing.case_id,
                    CaseStatus::Aborted {
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    /// Where a case stands, from the docket or the store.
    pub async fn case_status(&self, id: CaseId) -> Result<CaseStatus, EngineError> {
        if let Some(status) = self.docket.get(id) {
            return Ok(status);
        }
        match self.ctx.store.court_case(id).await? {
            Some(case) => Ok(CaseStatus::Decided { case }),
            None => Err(EngineError::not_found("court case", id)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::dice::ScriptedDice;
    use crate::events::EventBus;
    use crate::memory::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        dice: Arc<ScriptedDice>,
        court: CourtEngine<MemoryStore>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dice = Arc::new(ScriptedDice::new(9));
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
            court: CourtEngine::new(ctx),
        }
    }

    async fn user(h: &Harness, id: i64, primary: u64, premium: u64) -> UserId {
        let mut user = User::new(UserId(id), Utc::now());
        user.primary = primary;
        user.premium = premium;
        h.store.put_user(user).await;
        UserId(id)
    }

    async fn settle(h: &Harness, id: CaseId) -> CourtCase {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = h.court.case_status(id).await.unwrap();
        assert!(matches!(status, CaseStatus::Decided { .. }), "{status:?}");
        h.store.cases().into_iter().find(|c| c.id == id).unwrap()
    }

    #[tokio::test]
    async fn filing_checks_run_in_order() {
        let h = harness();
        let poor = user(&h, 1, 100, 2).await;
        let rich = user(&h, 2, 100, 50).await;

        let err = h.court.file(CourtType::Selezenka, poor, rich).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { required: 3, available: 2, .. }));

        let err = h.court.file(CourtType::Selezenka, rich, rich).await.unwrap_err();
        assert!(matches!(err, EngineError::SelfTarget));

        let err = h
            .court
            .file(CourtType::Selezenka, rich, UserId(404))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DefendantNotFound));
        assert!(h.store.user(UserId(404)).await.unwrap().is_none());

        let mut banned = User::new(UserId(3), Utc::now());
        banned.is_banned = true;
        banned.banned_until = Some(Utc::now() + TimeDelta::hours(1));
        h.store.put_user(banned).await;
        let err = h.court.file(CourtType::Kishka, rich, UserId(3)).await.unwrap_err();
        assert!(matches!(err, EngineError::DefendantBanned { .. }));

        assert_eq!(h.store.user(rich).await.unwrap().unwrap().premium, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn selezenka_fine_moves_to_plaintiff() {
        let h = harness();
        let plaintiff = user(&h, 1, 100, 10).await;
        let defendant = user(&h, 2, 80, 0).await;
        h.dice.push_units([0.1]);

        let filing = h.court.file(CourtType::Selezenka, plaintiff, defendant).await.unwrap();
        assert_eq!(h.store.user(plaintiff).await.unwrap().unwrap().premium, 7);
        assert!(matches!(
            h.court.case_status(filing.case_id).await.unwrap(),
            CaseStatus::Deliberating { .. }
        ));

        let case = settle(&h, filing.case_id).await;
        assert_eq!(case.verdict, Verdict::Guilty);
        assert_eq!(case.fine, 50);
        assert_eq!(h.store.user(plaintiff).await.unwrap().unwrap().primary, 150);
        assert_eq!(h.store.user(defendant).await.unwrap().unwrap().primary, 30);
        assert_eq!(h.store.cases().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn broke_defendant_gets_warning() {
        let h = harness();
        let plaintiff = user(&h, 1, 100, 10).await;
        let mut broke = User::new(UserId(2), Utc::now());
        broke.primary = 10;
        broke.warnings = 2;
        h.store.put_user(broke).await;
        h.dice.push_units([0.5]);

        let filing = h.court.file(CourtType::Redodendron, plaintiff, UserId(2)).await.unwrap();
        let case = settle(&h, filing.case_id).await;
        assert_eq!(case.verdict, Verdict::Warning);
        assert_eq!(case.fine, 0);
        assert_eq!(case.result, "warning_rollover");

        let defendant = h.store.user(UserId(2)).await.unwrap().unwrap();
        assert_eq!(defendant.warnings, 0);
        assert_eq!(defendant.perforation_count, 1);
        assert_eq!(defendant.health, 70);
        assert_eq!(h.store.user(plaintiff).await.unwrap().unwrap().premium, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn redodendron_burns_fine_and_pays_bonus() {
        let h = harness();
        let plaintiff = user(&h, 1, 100, 10).await;
        let defendant = user(&h, 2, 100, 0).await;
        h.dice.push_units([0.2]);

        let filing = h.court.file(CourtType::Redodendron, plaintiff, defendant).await.unwrap();
        let case = settle(&h, filing.case_id).await;
        assert_eq!(case.verdict, Verdict::Guilty);
        let plaintiff = h.store.user(plaintiff).await.unwrap().unwrap();
        assert_eq!((plaintiff.primary, plaintiff.premium), (100, 7));
        assert_eq!(h.store.user(defendant).await.unwrap().unwrap().primary, 70);
    }

    #[tokio::test(start_paused = true)]
    async fn kishka_banishes_and_confiscates() {
        let h = harness();
        let plaintiff = user(&h, 1, 100, 20).await;
        let defendant = user(&h, 2, 150, 0).await;
        h.dice.push_units([0.1]);

        let filing = h.court.file(CourtType::Kishka, plaintiff, defendant).await.unwrap();
        let case = settle(&h, filing.case_id).await;
        assert_eq!(case.verdict, Verdict::Banished);
        assert_eq!(case.fine, 100);

        let banished = h.store.user(defendant).await.unwrap().unwrap();
        assert_eq!(banished.primary, 50);
        assert_eq!(banished.health, 50);
        assert!(banished.is_banned);
        assert_eq!(h.store.user(plaintiff).await.unwrap().unwrap().primary, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn acquittal_moves_nothing() {
        let h = harness();
        let plaintiff = user(&h, 1, 100, 20).await;
        let defendant = user(&h, 2, 150, 0).await;
        h.dice.push_units([0.9]);

        let filing = h.court.file(CourtType::Kishka, plaintiff, defendant).await.unwrap();
        let case = settle(&h, filing.case_id).await;
        assert_eq!(case.verdict, Verdict::NotGuilty);
        assert_eq!(h.store.user(defendant).await.unwrap().unwrap().primary, 150);
        assert_eq!(h.store.user(plaintiff).await.unwrap().unwrap().premium, 10);
    }

    #[test]
    fn docket_evicts_oldest_finished_cases() {
        let docket = Docket::new(2);
        let first = CaseId::new();
        let second = CaseId::new();
        let third = CaseId::new();
        docket.record(first, CaseStatus::Aborted { reason: "x".to_owned() });
        docket.record(second, CaseStatus::Deliberating { decide_at: Utc::now() });
        docket.record(third, CaseStatus::Aborted { reason: "y".to_owned() });
        assert!(docket.get(first).is_none());
        assert!(docket.get(second).is_some());
        assert!(docket.get(third).is_some());
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let h = harness();
        let err = h.court.case_status(CaseId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::EntityNotFound { .. }));
    }
}
