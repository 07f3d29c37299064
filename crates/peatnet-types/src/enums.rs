//! Enumeration types shared across the engine.
//!
//! Every enum that is persisted or published carries a stable snake-case tag
//! via [`as_str`](Currency::as_str)-style accessors; the storage layer maps
//! those tags back with its own parsers.

use serde::{Deserialize, Serialize};

/// The two in-game currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Base resource (peat), earned by mining and prospecting.
    Primary,
    /// Scarce resource (fiber), earned by collection and defense.
    Premium,
}

impl Currency {
    /// Stable tag for this currency.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Premium => "premium",
        }
    }
}

/// The three courts a plaintiff can file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourtType {
    /// Court of the Duodenal Spleen: fines, warnings, acquittals.
    Selezenka,
    /// Court of the Rhododendron: fines with a premium bonus to the plaintiff.
    Redodendron,
    /// Court of the Rectum: banishment and confiscation.
    Kishka,
}

impl CourtType {
    /// All court types, in filing-cost order.
    pub const ALL: [Self; 3] = [Self::Selezenka, Self::Redodendron, Self::Kishka];

    /// Stable tag for this court type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Selezenka => "selezenka",
            Self::Redodendron => "redodendron",
            Self::Kishka => "kishka",
        }
    }
}

/// Hazard categories the danger scheduler can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    /// CO2 emission; mitigated by a single user's counter action.
    Co2,
    /// Turtle swarm; mitigated by a quorum of defenders.
    Turtles,
    /// Perforation of one random chat member.
    Perforation,
}

impl HazardKind {
    /// Hazards drawn uniformly on every scheduler firing.
    pub const SCHEDULED: [Self; 3] = [Self::Co2, Self::Turtles, Self::Perforation];

    /// Stable tag for this hazard kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Co2 => "co2",
            Self::Turtles => "turtles",
            Self::Perforation => "perforation",
        }
    }
}

/// What brought a hazard into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardCause {
    /// The periodic danger scheduler.
    Scheduler,
    /// A prospecting attempt that hit a CO2 pocket.
    Prospecting,
}

/// Lifecycle of a cooperative turtle defense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenseState {
    /// Defenders are gathering; quorum not reached yet.
    Forming,
    /// Quorum reached and rewards paid.
    Resolved,
    /// Overwritten by a newer hazard before quorum.
    Expired,
}

/// pH remediation actions a user can pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// Liming: raises pH, paid in premium currency.
    Lime,
    /// Peat feeding: gently raises pH, paid in primary currency.
    PeatFeed,
    /// Acidifying substrate: lowers an alkaline pH.
    Acidify,
    /// Emergency reset for critical readings.
    Emergency,
}

impl RemediationAction {
    /// Stable tag for this action.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lime => "lime",
            Self::PeatFeed => "peat_feed",
            Self::Acidify => "acidify",
            Self::Emergency => "emergency",
        }
    }
}

/// Qualitative pH bands used for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhBand {
    /// Below 4.0.
    CriticalAcid,
    /// From 4.0 up to (not including) 5.5.
    Acidic,
    /// From 5.5 to 6.5 inclusive.
    Balanced,
    /// Above 6.5 up to 7.5 inclusive.
    Alkaline,
    /// Above 7.5.
    CriticalAlkaline,
}

/// Tags for the append-only mining/economy log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningAction {
    /// Manual mining on the hourly cooldown.
    Mining,
    /// Batch passive accrual.
    PassiveSweep,
    /// Prospecting hit a CO2 pocket.
    ProspectCo2,
    /// Prospecting hit a jackpot vein.
    ProspectJackpot,
    /// Ordinary prospecting find.
    ProspectNormal,
    /// Daily fiber collection.
    Cellulose,
    /// Primary-to-premium exchange.
    Exchange,
    /// Paid pH remediation.
    Remediation,
    /// Reward for countering CO2.
    Co2Defense,
    /// Reward for joining a successful turtle defense.
    TurtleDefense,
    /// Loss from a turtle damage tick.
    TurtleDamage,
    /// Court filing fee.
    CourtFee,
    /// Paid perforation treatment.
    Treatment,
}

impl MiningAction {
    /// Stable tag for this action.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mining => "mining",
            Self::PassiveSweep => "passive_sweep",
            Self::ProspectCo2 => "prospect_co2",
            Self::ProspectJackpot => "prospect_jackpot",
            Self::ProspectNormal => "prospect_normal",
            Self::Cellulose => "cellulose",
            Self::Exchange => "exchange",
            Self::Remediation => "remediation",
            Self::Co2Defense => "co2_defense",
            Self::TurtleDefense => "turtle_defense",
            Self::TurtleDamage => "turtle_damage",
            Self::CourtFee => "court_fee",
            Self::Treatment => "treatment",
        }
    }
}

/// Verdict drawn by a court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Defendant found guilty.
    Guilty,
    /// Defendant acquitted.
    NotGuilty,
    /// Defendant let off with a formal warning.
    Warning,
    /// Defendant banished to the swamp.
    Banished,
}

impl Verdict {
    /// Stable tag for this verdict.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guilty => "guilty",
            Self::NotGuilty => "not_guilty",
            Self::Warning => "warning",
            Self::Banished => "banished",
        }
    }
}

/// Perforation risk derived from a user's infraction counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No perforations, fewer than two warnings.
    Low,
    /// Two warnings on record.
    Medium,
    /// One perforation.
    High,
    /// Two or more perforations.
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tags_match_as_str() {
        for court in CourtType::ALL {
            let json = serde_json::to_string(&court).ok();
            assert_eq!(json, Some(format!("\"{}\"", court.as_str())));
        }
        for kind in HazardKind::SCHEDULED {
            let json = serde_json::to_string(&kind).ok();
            assert_eq!(json, Some(format!("\"{}\"", kind.as_str())));
        }
        let json = serde_json::to_string(&RemediationAction::PeatFeed).ok();
        assert_eq!(json.as_deref(), Some("\"peat_feed\""));
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }
}
