//! The entity store contract.
//!
//! All state changes go through one primitive, [`EntityStore::transact`]:
//!
//! 1. The store locks the scoped chat row (creating it if missing), then the
//!    scoped user rows in ascending id order (creating those marked for
//!    creation). New rows and chat memberships persist even if the closure
//!    later fails.
//! 2. The closure receives a fresh [`TxView`] of the locked rows and returns
//!    a [`Commit`] describing patches and log records, or an error.
//! 3. The store stages every patch via [`Commit::stage`]; if any patch breaks
//!    an invariant nothing is written. Otherwise patched rows and log records
//!    are written atomically and the locks are released.
//!
//! Reads outside `transact` return snapshots that may be stale by the time
//! they are used; nothing may be written back from them.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use chrono::{DateTime, Utc};
use peatnet_types::{
    CaseId, Chat, ChatId, ChatPatch, CourtCase, MiningEvent, User, UserId, UserPatch,
};

use crate::error::StoreError;

/// Template for users created inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewUser {
    /// Starting primary balance.
    pub primary: u64,
    /// Starting premium balance.
    pub premium: u64,
    /// Starting health.
    pub health: u32,
    /// Creation instant; also the initial cooldown anchors.
    pub at: DateTime<Utc>,
}

impl NewUser {
    /// Materialize a user record.
    pub const fn build(&self, id: UserId) -> User {
        let mut user = User::new(id, self.at);
        user.primary = self.primary;
        user.premium = self.premium;
        user.health = self.health;
        user
    }
}

/// Rows a transaction locks.
#[derive(Debug, Clone)]
pub struct TxScope {
    chat: Option<ChatId>,
    create: BTreeSet<UserId>,
    existing: BTreeSet<UserId>,
    members: BTreeSet<UserId>,
    seed: NewUser,
}

impl TxScope {
    /// An empty scope; `seed` shapes any users it creates.
    pub const fn new(seed: NewUser) -> Self {
        Self {
            chat: None,
            create: BTreeSet::new(),
            existing: BTreeSet::new(),
            members: BTreeSet::new(),
            seed,
        }
    }

    /// Lock (and lazily create) a chat.
    #[must_use]
    pub const fn chat(mut self, id: ChatId) -> Self {
        self.chat = Some(id);
        self
    }

    /// Lock a user, creating them on first sight.
    #[must_use]
    pub fn user(mut self, id: UserId) -> Self {
        self.existing.remove(&id);
        self.create.insert(id);
        self
    }

    /// Lock a user acting inside the scoped chat: created on first sight and
    /// recorded as a member of the chat.
    #[must_use]
    pub fn actor(mut self, id: UserId) -> Self {
        self.members.insert(id);
        self.user(id)
    }

    /// Lock a user only if they already exist.
    #[must_use]
    pub fn existing(mut self, id: UserId) -> Self {
        if !self.create.contains(&id) {
            self.existing.insert(id);
        }
        self
    }

    /// The scoped chat.
    pub const fn chat_id(&self) -> Option<ChatId> {
        self.chat
    }

    /// Users to create if missing, ascending.
    pub fn created(&self) -> impl Iterator<Item = UserId> + '_ {
        self.create.iter().copied()
    }

    /// Every scoped user in lock order (ascending id).
    pub fn lock_order(&self) -> Vec<UserId> {
        self.create.union(&self.existing).copied().collect()
    }

    /// Users to record as chat members. Empty when no chat is scoped.
    pub fn members(&self) -> impl Iterator<Item = UserId> + '_ {
        self.members
            .iter()
            .copied()
            .filter(|_| self.chat.is_some())
    }

    /// Template for created users.
    pub const fn seed(&self) -> &NewUser {
        &self.seed
    }
}

/// Snapshot of the locked rows, handed to a transaction closure.
#[derive(Debug, Clone, Default)]
pub struct TxView {
    chat: Option<Chat>,
    users: BTreeMap<UserId, User>,
}

impl TxView {
    /// Assemble a view from locked rows.
    pub fn new(chat: Option<Chat>, users: impl IntoIterator<Item = User>) -> Self {
        Self {
            chat,
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    /// The locked chat.
    pub const fn chat(&self) -> Option<&Chat> {
        self.chat.as_ref()
    }

    /// A locked user, or `None` if they do not exist.
    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    /// The locked chat, which must be in scope.
    pub fn require_chat(&self) -> Result<&Chat, StoreError> {
        self.chat.as_ref().ok_or(StoreError::Missing {
            entity: "chat",
            id: "scoped".to_owned(),
        })
    }

    /// A locked user that must exist.
    pub fn require_user(&self, id: UserId) -> Result<&User, StoreError> {
        self.users.get(&id).ok_or_else(|| StoreError::Missing {
            entity: "user",
            id: id.to_string(),
        })
    }

    /// All locked users, ascending.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}

/// What a transaction closure wants written, plus the value it returns.
#[derive(Debug, Clone)]
pub struct Commit<T> {
    users: Vec<(UserId, UserPatch)>,
    chat: Option<ChatPatch>,
    mining: Vec<MiningEvent>,
    court_case: Option<CourtCase>,
    value: T,
}

impl<T> Commit<T> {
    /// A commit that writes nothing.
    pub const fn new(value: T) -> Self {
        Self {
            users: Vec::new(),
            chat: None,
            mining: Vec::new(),
            court_case: None,
            value,
        }
    }

    /// Patch a user. Several patches to one user apply in order.
    #[must_use]
    pub fn user(mut self, id: UserId, patch: UserPatch) -> Self {
        if !patch.is_empty() {
            self.users.push((id, patch));
        }
        self
    }

    /// Patch the scoped chat.
    #[must_use]
    pub fn chat(mut self, patch: ChatPatch) -> Self {
        if !patch.is_empty() {
            self.chat = Some(patch);
        }
        self
    }

    /// Append a mining log record.
    #[must_use]
    pub fn log(mut self, event: MiningEvent) -> Self {
        self.mining.push(event);
        self
    }

    /// Append a court case record.
    #[must_use]
    pub fn case(mut self, case: CourtCase) -> Self {
        self.court_case = Some(case);
        self
    }

    /// Apply every patch to the view, producing the rows to write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invariant`] if a patch breaks a record invariant
    /// and [`StoreError::OutOfScope`] if it targets an unlocked row.
    pub fn stage(self, view: &TxView) -> Result<Staged<T>, StoreError> {
        let mut touched: BTreeMap<UserId, User> = BTreeMap::new();
        for (id, patch) in &self.users {
            let current = match touched.get(id) {
                Some(user) => user,
                None => view.user(*id).ok_or_else(|| StoreError::OutOfScope {
                    entity: "user",
                    id: id.to_string(),
                })?,
            };
            let next = patch.apply(current)?;
            touched.insert(*id, next);
        }

        let chat = match &self.chat {
            Some(patch) => {
                let current = view.chat().ok_or(StoreError::OutOfScope {
                    entity: "chat",
                    id: "unscoped".to_owned(),
                })?;
                Some(patch.apply(current)?)
            }
            None => None,
        };

        Ok(Staged {
            users: touched.into_values().collect(),
            chat,
            mining: self.mining,
            court_case: self.court_case,
            value: self.value,
        })
    }
}

/// Validated rows and records ready to be written.
#[derive(Debug, Clone)]
pub struct Staged<T> {
    /// Updated user rows, ascending by id.
    pub users: Vec<User>,
    /// Updated chat row.
    pub chat: Option<Chat>,
    /// Mining log records to append.
    pub mining: Vec<MiningEvent>,
    /// Court case to append.
    pub court_case: Option<CourtCase>,
    /// The closure's return value.
    pub value: T,
}

/// Durable storage for users, chats and the append-only logs.
pub trait EntityStore: Send + Sync + 'static {
    /// Run `f` against locked rows and commit what it returns.
    fn transact<T, E, F>(
        &self,
        scope: TxScope,
        f: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        T: Send,
        E: From<StoreError> + Send,
        F: FnOnce(&TxView) -> Result<Commit<T>, E> + Send;

    /// Snapshot of one user.
    fn user(&self, id: UserId) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Snapshot of one chat.
    fn chat(&self, id: ChatId) -> impl Future<Output = Result<Option<Chat>, StoreError>> + Send;

    /// Every known chat.
    fn chat_ids(&self) -> impl Future<Output = Result<Vec<ChatId>, StoreError>> + Send;

    /// Every known user.
    fn user_ids(&self) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    /// Users who have acted inside a chat, ascending.
    fn chat_members(
        &self,
        chat: ChatId,
    ) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    /// Richest users by primary balance.
    fn top_users(&self, limit: usize) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;

    /// Cases a user took part in, newest first.
    fn court_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CourtCase>, StoreError>> + Send;

    /// A user's mining log, newest first.
    fn mining_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MiningEvent>, StoreError>> + Send;

    /// A recorded case.
    fn court_case(
        &self,
        id: CaseId,
    ) -> impl Future<Output = Result<Option<CourtCase>, StoreError>> + Send;
}
