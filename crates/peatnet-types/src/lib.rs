//! Shared type definitions for the Peatnet game-economy engine.
//!
//! This crate is the single source of truth for the records, identifiers and
//! notifications exchanged between the engine, its stores and the binary.
//!
//! # Modules
//!
//! - [`ids`] -- Platform keys for users and chats, UUID ids for court cases
//! - [`enums`] -- Currencies, courts, hazards, remediation actions, log tags
//! - [`structs`] -- Persisted records (users, chats, court cases, mining log)
//! - [`patch`] -- Typed partial updates validated against record invariants
//! - [`events`] -- Outbound engine notifications

pub mod enums;
pub mod events;
pub mod ids;
pub mod patch;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    CourtType, Currency, DefenseState, HazardCause, HazardKind, MiningAction, PhBand,
    RemediationAction, RiskLevel, Verdict,
};
pub use events::{DamageLoss, EngineEvent};
pub use ids::{CaseId, ChatId, UserId};
pub use patch::{BanChange, ChatPatch, PH_MAX, PH_MIN, PatchError, UserPatch, Warning};
pub use structs::{
    Chat, CourtCase, INITIAL_PH, MAX_HEALTH, MiningEvent, STARTING_PREMIUM, STARTING_PRIMARY,
    User, WARNING_LIMIT,
};
