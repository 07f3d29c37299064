//! Outbound notifications published by the engine.
//!
//! Events are fire-and-forget: the engine never waits for delivery and never
//! fails an operation because nobody is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{CourtType, HazardCause, HazardKind};
use crate::ids::{CaseId, ChatId, UserId};
use crate::structs::CourtCase;

/// Primary currency lost by one chat member to a turtle damage tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageLoss {
    /// Affected member.
    pub user_id: UserId,
    /// Amount actually deducted.
    pub amount: u64,
}

/// Something other parties may want to tell the chat about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A hazard appeared in a chat.
    HazardSpawned {
        /// Chat the hazard lives in.
        chat_id: ChatId,
        /// Kind of hazard.
        kind: HazardKind,
        /// Who caused it.
        cause: HazardCause,
        /// Turtle count for swarms.
        severity: Option<u32>,
        /// Generation stamp for swarms.
        generation: Option<u64>,
        /// When it appeared.
        at: DateTime<Utc>,
    },

    /// A hazard was mitigated.
    HazardResolved {
        /// Chat the hazard lived in.
        chat_id: ChatId,
        /// Kind of hazard.
        kind: HazardKind,
        /// Users who took part, in ascending id order.
        participants: Vec<UserId>,
        /// Primary reward credited to each participant.
        reward: u64,
        /// When it was resolved.
        at: DateTime<Utc>,
    },

    /// An unresolved turtle swarm was replaced by a new one.
    HazardExpired {
        /// Chat the hazard lived in.
        chat_id: ChatId,
        /// Kind of hazard.
        kind: HazardKind,
        /// Generation of the expired swarm.
        generation: u64,
        /// Defenders gathered before expiry.
        participants: usize,
        /// When it expired.
        at: DateTime<Utc>,
    },

    /// A turtle damage tick landed.
    HazardDamageApplied {
        /// Chat the swarm lives in.
        chat_id: ChatId,
        /// Generation of the swarm that caused the damage.
        generation: u64,
        /// Per-member losses; members with nothing to lose are omitted.
        losses: Vec<DamageLoss>,
        /// When the damage landed.
        at: DateTime<Utc>,
    },

    /// A chat member was perforated.
    PerforationInflicted {
        /// Chat where it happened.
        chat_id: ChatId,
        /// Victim.
        user_id: UserId,
        /// Health actually lost.
        health_loss: u32,
        /// When it happened.
        at: DateTime<Utc>,
    },

    /// A court case was filed and is deliberating.
    CaseFiled {
        /// Case id.
        case_id: CaseId,
        /// Which court.
        court_type: CourtType,
        /// Who filed.
        plaintiff: UserId,
        /// Who was sued.
        defendant: UserId,
        /// When the verdict is due.
        decide_at: DateTime<Utc>,
    },

    /// A court reached its verdict.
    VerdictReached {
        /// The recorded case.
        case: CourtCase,
    },
}

impl EngineEvent {
    /// Chat the event belongs to, if any. Court events are chat-agnostic.
    pub const fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::HazardSpawned { chat_id, .. }
            | Self::HazardResolved { chat_id, .. }
            | Self::HazardExpired { chat_id, .. }
            | Self::HazardDamageApplied { chat_id, .. }
            | Self::PerforationInflicted { chat_id, .. } => Some(*chat_id),
            Self::CaseFiled { .. } | Self::VerdictReached { .. } => None,
        }
    }

    /// Stable tag for this event, matching the serialized `type` field.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::HazardSpawned { .. } => "hazard_spawned",
            Self::HazardResolved { .. } => "hazard_resolved",
            Self::HazardExpired { .. } => "hazard_expired",
            Self::HazardDamageApplied { .. } => "hazard_damage_applied",
            Self::PerforationInflicted { .. } => "perforation_inflicted",
            Self::CaseFiled { .. } => "case_filed",
            Self::VerdictReached { .. } => "verdict_reached",
        }
    }
}
