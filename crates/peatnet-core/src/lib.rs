//! Game-economy engine for the Peatnet chat bot.
//!
//! Users mine and trade two currencies in chat "ecosystems" whose soil pH
//! drifts and can be corrected. A periodic scheduler spawns hazards that
//! chat members defend against together, and a small court system lets
//! users sue each other. Every state change goes through the transactional
//! [`EntityStore`] contract, so balances never go negative and no two
//! concurrent operations overwrite each other.
//!
//! # Modules
//!
//! - [`clock`] -- [`Clock`] seam with system and manual clocks.
//! - [`config`] -- Configuration loading from `peatnet-config.yaml`.
//! - [`context`] -- Shared handles passed to every component.
//! - [`court`] -- Filing, deliberation and verdicts for the three courts.
//! - [`defense`] -- Joining turtle defenses and countering CO2 releases.
//! - [`dice`] -- [`Dice`] seam with seeded and scripted random sources.
//! - [`economy`] -- Mining, prospecting, cellulose, exchange, treatment and
//!   passive income.
//! - [`engine`] -- The [`Engine`] facade used by the command layer.
//! - [`environment`] -- pH diagnosis, sampling and remediation.
//! - [`error`] -- [`EngineError`] and [`StoreError`].
//! - [`events`] -- Broadcast bus for outbound events.
//! - [`hazard`] -- In-memory table of active turtle swarms.
//! - [`memory`] -- In-memory [`EntityStore`] for tests and local runs.
//! - [`runner`] -- Background scheduler and passive income loops.
//! - [`scheduler`] -- The danger scheduler.
//! - [`store`] -- The [`EntityStore`] contract and its transaction types.
//!
//! [`Clock`]: clock::Clock
//! [`Dice`]: dice::Dice
//! [`Engine`]: engine::Engine
//! [`EngineError`]: error::EngineError
//! [`StoreError`]: error::StoreError
//! [`EntityStore`]: store::EntityStore

pub mod clock;
pub mod config;
pub mod context;
pub mod court;
pub mod defense;
pub mod dice;
pub mod economy;
pub mod engine;
pub mod environment;
pub mod error;
pub mod events;
pub mod hazard;
pub mod memory;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use engine::Engine;
pub use error::{EngineError, StoreError};
pub use store::EntityStore;
