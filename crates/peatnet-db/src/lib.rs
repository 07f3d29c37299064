//! `PostgreSQL` persistence for the Peatnet engine.
//!
//! [`PostgresStore`] implements the engine's [`EntityStore`] contract on top
//! of a [`PostgresPool`]. Row locks are taken with `SELECT ... FOR UPDATE`
//! in a fixed order (the chat first, then users by ascending id), so two
//! transactions touching the same rows serialize instead of deadlocking.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`store`] -- The [`EntityStore`] implementation and history queries
//! - [`rows`] -- Row structs and tag parsers
//! - [`error`] -- Shared error types
//!
//! [`EntityStore`]: peatnet_core::EntityStore

pub mod error;
pub mod postgres;
pub mod rows;
pub mod store;

pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use store::PostgresStore;
