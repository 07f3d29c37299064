//! Row structs for the Peatnet tables and their conversions.
//!
//! Enums are stored as their stable snake-case tags (`as_str`); the parsers
//! here map them back and reject anything unknown. Unsigned amounts are
//! stored as `BIGINT` and checked on the way back in.

use chrono::{DateTime, Utc};
use peatnet_types::{
    CaseId, Chat, ChatId, CourtCase, CourtType, HazardKind, MiningAction, MiningEvent, User,
    UserId, Verdict,
};
use uuid::Uuid;

use crate::error::DbError;

/// Column list shared by every `users` query.
pub(crate) const USER_COLUMNS: &str = "id, primary_balance, premium_balance, health, warnings, \
     perforation_count, is_banned, banned_until, last_passive_income_at, last_cellulose_at, \
     created_at";

/// Column list shared by every `chats` query.
pub(crate) const CHAT_COLUMNS: &str =
    "id, ph_level, last_danger_at, danger_type, turtle_active, co2_active";

/// Column list shared by every `court_cases` query.
pub(crate) const CASE_COLUMNS: &str =
    "id, plaintiff, defendant, court_type, verdict, fine, result, decided_at";

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Platform user id.
    pub id: i64,
    /// Primary currency balance.
    pub primary_balance: i64,
    /// Premium currency balance.
    pub premium_balance: i64,
    /// Health points.
    pub health: i32,
    /// Warnings on record.
    pub warnings: i32,
    /// Untreated perforations.
    pub perforation_count: i32,
    /// Ban flag.
    pub is_banned: bool,
    /// Ban expiry.
    pub banned_until: Option<DateTime<Utc>>,
    /// Passive income anchor.
    pub last_passive_income_at: DateTime<Utc>,
    /// Fiber collection anchor.
    pub last_cellulose_at: DateTime<Utc>,
    /// First sight.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId(row.id),
            primary: unsigned("users.primary_balance", row.primary_balance)?,
            premium: unsigned("users.premium_balance", row.premium_balance)?,
            health: counter("users.health", row.health)?,
            warnings: counter("users.warnings", row.warnings)?,
            perforation_count: counter("users.perforation_count", row.perforation_count)?,
            is_banned: row.is_banned,
            banned_until: row.banned_until,
            last_passive_income_at: row.last_passive_income_at,
            last_cellulose_at: row.last_cellulose_at,
            created_at: row.created_at,
        })
    }
}

/// A row from the `chats` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRow {
    /// Platform chat id.
    pub id: i64,
    /// Soil pH.
    pub ph_level: f64,
    /// Last scheduler firing.
    pub last_danger_at: Option<DateTime<Utc>>,
    /// Last hazard tag.
    pub danger_type: Option<String>,
    /// Turtle swarm flag.
    pub turtle_active: bool,
    /// CO2 emission flag.
    pub co2_active: bool,
}

impl TryFrom<ChatRow> for Chat {
    type Error = DbError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ChatId(row.id),
            ph_level: row.ph_level,
            last_danger_at: row.last_danger_at,
            danger_type: row.danger_type.as_deref().map(hazard_kind).transpose()?,
            turtle_active: row.turtle_active,
            co2_active: row.co2_active,
        })
    }
}

/// A row from the `court_cases` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourtCaseRow {
    /// Case id.
    pub id: Uuid,
    /// Plaintiff user id.
    pub plaintiff: i64,
    /// Defendant user id.
    pub defendant: i64,
    /// Court tag.
    pub court_type: String,
    /// Verdict tag.
    pub verdict: String,
    /// Primary moved from the defendant.
    pub fine: i64,
    /// Penalty summary.
    pub result: String,
    /// Verdict time.
    pub decided_at: DateTime<Utc>,
}

impl TryFrom<CourtCaseRow> for CourtCase {
    type Error = DbError;

    fn try_from(row: CourtCaseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CaseId(row.id),
            plaintiff: UserId(row.plaintiff),
            defendant: UserId(row.defendant),
            court_type: court_type(&row.court_type)?,
            verdict: verdict(&row.verdict)?,
            fine: unsigned("court_cases.fine", row.fine)?,
            result: row.result,
            decided_at: row.decided_at,
        })
    }
}

/// A row from the `mining_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MiningEventRow {
    /// Affected user.
    pub user_id: i64,
    /// Action tag.
    pub action: String,
    /// Signed amount.
    pub amount: i64,
    /// Event time.
    pub at: DateTime<Utc>,
}

impl TryFrom<MiningEventRow> for MiningEvent {
    type Error = DbError;

    fn try_from(row: MiningEventRow) -> Result<Self, Self::Error> {
        Ok(Self::new(
            UserId(row.user_id),
            mining_action(&row.action)?,
            row.amount,
            row.at,
        ))
    }
}

/// Convert rows, failing on the first bad one.
pub(crate) fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn unsigned(column: &'static str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value)
        .ok()
        .ok_or_else(|| DbError::conversion(column, value))
}

fn counter(column: &'static str, value: i32) -> Result<u32, DbError> {
    u32::try_from(value)
        .ok()
        .ok_or_else(|| DbError::conversion(column, value))
}

/// Store an unsigned amount. Values past `i64::MAX` cannot arise from
/// checked patches; they are clamped rather than wrapped.
pub(crate) fn bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Store an unsigned counter.
pub(crate) fn integer(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn hazard_kind(tag: &str) -> Result<HazardKind, DbError> {
    HazardKind::SCHEDULED
        .into_iter()
        .find(|kind| kind.as_str() == tag)
        .ok_or_else(|| DbError::conversion("chats.danger_type", tag))
}

fn court_type(tag: &str) -> Result<CourtType, DbError> {
    CourtType::ALL
        .into_iter()
        .find(|court| court.as_str() == tag)
        .ok_or_else(|| DbError::conversion("court_cases.court_type", tag))
}

fn verdict(tag: &str) -> Result<Verdict, DbError> {
    match tag {
        "guilty" => Ok(Verdict::Guilty),
        "not_guilty" => Ok(Verdict::NotGuilty),
        "warning" => Ok(Verdict::Warning),
        "banished" => Ok(Verdict::Banished),
        other => Err(DbError::conversion("court_cases.verdict", other)),
    }
}

fn mining_action(tag: &str) -> Result<MiningAction, DbError> {
    let action = match tag {
        "mining" => MiningAction::Mining,
        "passive_sweep" => MiningAction::PassiveSweep,
        "prospect_co2" => MiningAction::ProspectCo2,
        "prospect_jackpot" => MiningAction::ProspectJackpot,
        "prospect_normal" => MiningAction::ProspectNormal,
        "cellulose" => MiningAction::Cellulose,
        "exchange" => MiningAction::Exchange,
        "remediation" => MiningAction::Remediation,
        "co2_defense" => MiningAction::Co2Defense,
        "turtle_defense" => MiningAction::TurtleDefense,
        "turtle_damage" => MiningAction::TurtleDamage,
        "court_fee" => MiningAction::CourtFee,
        "treatment" => MiningAction::Treatment,
        other => return Err(DbError::conversion("mining_events.action", other)),
    };
    Ok(action)
}
