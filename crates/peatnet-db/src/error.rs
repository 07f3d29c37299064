//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] errors and row conversion failures. The engine only ever sees
//! them as a [`StoreError`].

use peatnet_core::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value does not fit the domain type.
    #[error("bad value in column {column}: {value}")]
    Conversion {
        /// Column that held the value.
        column: &'static str,
        /// The offending value, rendered.
        value: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    pub(crate) fn conversion(column: &'static str, value: impl ToString) -> Self {
        Self::Conversion {
            column,
            value: value.to_string(),
        }
    }

    /// Whether the database could not be reached at all.
    pub const fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Postgres(
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
            )
        )
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_connectivity() {
            Self::Unavailable {
                reason: err.to_string(),
            }
        } else {
            Self::Backend {
                source: Box::new(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_means_unavailable() {
        let store = StoreError::from(DbError::Postgres(sqlx::Error::PoolTimedOut));
        assert!(matches!(store, StoreError::Unavailable { .. }));

        let store = StoreError::from(DbError::conversion("users.primary_balance", -4));
        assert!(matches!(store, StoreError::Backend { .. }));
        assert!(store.to_string().contains("users.primary_balance"));
    }
}
