//! Type-safe identifier wrappers.
//!
//! Users and chats are keyed by the opaque integer ids handed to us by the
//! chat platform, so they wrap an `i64`. Court cases are minted by the engine
//! itself and use UUID v7 (time-ordered) like every other generated id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a platform-assigned `i64` key.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Return the raw platform key.
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_key! {
    /// Platform identifier of a chat participant.
    UserId
}

define_key! {
    /// Platform identifier of a chat group (one ecosystem per chat).
    ChatId
}

define_id! {
    /// Identifier of a court case, assigned when the case is filed.
    CaseId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_serialize_as_bare_integers() {
        let json = serde_json::to_string(&UserId(42)).ok();
        assert_eq!(json.as_deref(), Some("42"));

        let chat: Result<ChatId, _> = serde_json::from_str("-1001");
        assert_eq!(chat.ok(), Some(ChatId(-1001)));
    }

    #[test]
    fn case_ids_are_time_ordered() {
        let first = CaseId::new();
        let second = CaseId::new();
        assert!(first <= second);
        assert_ne!(first.into_inner(), Uuid::nil());
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(ChatId(-7).to_string(), "-7");
        let id = CaseId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
