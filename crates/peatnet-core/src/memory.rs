//! In-memory [`EntityStore`].
//!
//! Each user and chat row sits behind its own async mutex, so transactions
//! on disjoint rows run in parallel while transactions sharing a row
//! serialize. The row maps themselves are guarded by short-lived std mutexes
//! that are never held across an await.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use peatnet_types::{CaseId, Chat, ChatId, CourtCase, MiningEvent, User, UserId};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::error::StoreError;
use crate::store::{Commit, EntityStore, TxScope, TxView};

type Row<T> = Arc<RowLock<T>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<BTreeMap<UserId, Row<User>>>,
    chats: Mutex<BTreeMap<ChatId, Row<Chat>>>,
    members: Mutex<BTreeMap<ChatId, BTreeSet<UserId>>>,
    cases: Mutex<Vec<CourtCase>>,
    mining: Mutex<Vec<MiningEvent>>,
    unavailable: AtomicBool,
    broken_chats: Mutex<BTreeSet<ChatId>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make transactions that lock `chat` fail with
    /// [`StoreError::Unavailable`] while every other chat keeps working.
    pub fn set_chat_unavailable(&self, chat: ChatId, unavailable: bool) {
        let mut broken = lock(&self.broken_chats);
        if unavailable {
            broken.insert(chat);
        } else {
            broken.remove(&chat);
        }
    }

    /// Insert or replace a user row outside any transaction.
    pub async fn put_user(&self, user: User) {
        let row = {
            let mut users = lock(&self.users);
            Arc::clone(
                users
                    .entry(user.id)
                    .or_insert_with(|| Arc::new(RowLock::new(user.clone()))),
            )
        };
        *row.lock().await = user;
    }

    /// Insert or replace a chat row outside any transaction.
    pub async fn put_chat(&self, chat: Chat) {
        let row = {
            let mut chats = lock(&self.chats);
            Arc::clone(
                chats
                    .entry(chat.id)
                    .or_insert_with(|| Arc::new(RowLock::new(chat.clone()))),
            )
        };
        *row.lock().await = chat;
    }

    /// Record a chat membership outside any transaction.
    pub fn add_member(&self, chat: ChatId, user: UserId) {
        lock(&self.members).entry(chat).or_default().insert(user);
    }

    /// Every mining log record, oldest first.
    pub fn mining_log(&self) -> Vec<MiningEvent> {
        lock(&self.mining).clone()
    }

    /// Every recorded court case, oldest first.
    pub fn cases(&self) -> Vec<CourtCase> {
        lock(&self.cases).clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable {
                reason: "memory store switched off".to_owned(),
            })
        } else {
            Ok(())
        }
    }

    fn chat_row(&self, id: ChatId) -> Row<Chat> {
        let mut chats = lock(&self.chats);
        Arc::clone(
            chats
                .entry(id)
                .or_insert_with(|| Arc::new(RowLock::new(Chat::new(id)))),
        )
    }

    fn user_row(&self, id: UserId, scope: &TxScope, create: bool) -> Option<Row<User>> {
        let mut users = lock(&self.users);
        if create {
            let row = users
                .entry(id)
                .or_insert_with(|| Arc::new(RowLock::new(scope.seed().build(id))));
            Some(Arc::clone(row))
        } else {
            users.get(&id).map(Arc::clone)
        }
    }

    async fn run<T, E, F>(&self, scope: TxScope, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&TxView) -> Result<Commit<T>, E>,
    {
        self.check()?;

        let mut chat_guard: Option<OwnedMutexGuard<Chat>> = None;
        if let Some(id) = scope.chat_id() {
            if lock(&self.broken_chats).contains(&id) {
                return Err(StoreError::Unavailable {
                    reason: format!("chat {id} switched off"),
                }
                .into());
            }
            chat_guard = Some(self.chat_row(id).lock_owned().await);
            let mut members = lock(&self.members);
            let set = members.entry(id).or_default();
            set.extend(scope.members());
        }

        let created: BTreeSet<UserId> = scope.created().collect();
        let mut user_guards: BTreeMap<UserId, OwnedMutexGuard<User>> = BTreeMap::new();
        for id in scope.lock_order() {
            if let Some(row) = self.user_row(id, &scope, created.contains(&id)) {
                user_guards.insert(id, row.lock_owned().await);
            }
        }

        let view = TxView::new(
            chat_guard.as_deref().cloned(),
            user_guards.values().map(|guard| (**guard).clone()),
        );
        let staged = f(&view)?.stage(&view)?;
        self.check()?;

        for user in staged.users {
            if let Some(guard) = user_guards.get_mut(&user.id) {
                **guard = user;
            }
        }
        if let (Some(chat), Some(guard)) = (staged.chat, chat_guard.as_mut()) {
            **guard = chat;
        }
        lock(&self.mining).extend(staged.mining);
        if let Some(case) = staged.court_case {
            lock(&self.cases).push(case);
        }
        Ok(staged.value)
    }

    async fn snapshot_users(&self) -> Vec<User> {
        let rows: Vec<Row<User>> = lock(&self.users).values().map(Arc::clone).collect();
        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(row.lock().await.clone());
        }
        users
    }
}

impl EntityStore for MemoryStore {
    fn transact<T, E, F>(
        &self,
        scope: TxScope,
        f: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        T: Send,
        E: From<StoreError> + Send,
        F: FnOnce(&TxView) -> Result<Commit<T>, E> + Send,
    {
        self.run(scope, f)
    }

    fn user(&self, id: UserId) -> impl Future<Output = Result<Option<User>, StoreError>> + Send {
        async move {
            self.check()?;
            let row = lock(&self.users).get(&id).map(Arc::clone);
            match row {
                Some(row) => Ok(Some(row.lock().await.clone())),
                None => Ok(None),
            }
        }
    }

    fn chat(&self, id: ChatId) -> impl Future<Output = Result<Option<Chat>, StoreError>> + Send {
        async move {
            self.check()?;
            let row = lock(&self.chats).get(&id).map(Arc::clone);
            match row {
                Some(row) => Ok(Some(row.lock().await.clone())),
                None => Ok(None),
            }
        }
    }

    fn chat_ids(&self) -> impl Future<Output = Result<Vec<ChatId>, StoreError>> + Send {
        async move {
            self.check()?;
            Ok(lock(&self.chats).keys().copied().collect())
        }
    }

    fn user_ids(&self) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send {
        async move {
            self.check()?;
            Ok(lock(&self.users).keys().copied().collect())
        }
    }

    fn chat_members(
        &self,
        chat: ChatId,
    ) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send {
        async move {
            self.check()?;
            Ok(lock(&self.members)
                .get(&chat)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default())
        }
    }

    fn top_users(&self, limit: usize) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send {
        async move {
            self.check()?;
            let mut users = self.snapshot_users().await;
            users.sort_by(|a, b| b.primary.cmp(&a.primary).then(a.id.cmp(&b.id)));
            users.truncate(limit);
            Ok(users)
        }
    }

    fn court_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CourtCase>, StoreError>> + Send {
        async move {
            self.check()?;
            Ok(lock(&self.cases)
                .iter()
                .rev()
                .filter(|case| case.plaintiff == user || case.defendant == user)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn mining_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MiningEvent>, StoreError>> + Send {
        async move {
            self.check()?;
            Ok(lock(&self.mining)
                .iter()
                .rev()
                .filter(|event| event.user_id == user)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn court_case(
        &self,
        id: CaseId,
    ) -> impl Future<Output = Result<Option<CourtCase>, StoreError>> + Send {
        async move {
            self.check()?;
            Ok(lock(&self.cases).iter().find(|case| case.id == id).cloned())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use peatnet_types::{ChatPatch, Currency, MiningAction, UserPatch};

    use super::*;
    use crate::error::EngineError;
    use crate::store::NewUser;

    fn scope() -> TxScope {
        TxScope::new(NewUser {
            primary: 100,
            premium: 5,
            health: 100,
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn creates_rows_on_first_sight() {
        let store = MemoryStore::new();
        let value = store
            .transact(scope().chat(ChatId(1)).actor(UserId(7)), |view| {
                let user = view.require_user(UserId(7))?;
                Ok::<_, StoreError>(Commit::new(user.primary))
            })
            .await
            .unwrap();
        assert_eq!(value, 100);
        assert!(store.chat(ChatId(1)).await.unwrap().is_some());
        assert_eq!(store.chat_members(ChatId(1)).await.unwrap(), vec![UserId(7)]);
    }

    #[tokio::test]
    async fn existing_scope_does_not_create() {
        let store = MemoryStore::new();
        let seen = store
            .transact(scope().existing(UserId(2)), |view| {
                Ok::<_, StoreError>(Commit::new(view.user(UserId(2)).is_some()))
            })
            .await
            .unwrap();
        assert!(!seen);
        assert!(store.user(UserId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closure_error_writes_no_patches() {
        let store = MemoryStore::new();
        let result: Result<(), EngineError> = store
            .transact(scope().user(UserId(1)), |_| Err(EngineError::NoEffectNeeded))
            .await;
        assert!(matches!(result, Err(EngineError::NoEffectNeeded)));
        let user = store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.primary, 100);
    }

    #[tokio::test]
    async fn invalid_patch_aborts_whole_commit() {
        let store = MemoryStore::new();
        let result = store
            .transact(scope().chat(ChatId(1)).user(UserId(1)), |_| {
                Ok::<_, StoreError>(
                    Commit::new(())
                        .chat(ChatPatch::new().co2(true))
                        .user(UserId(1), UserPatch::new().debit(Currency::Premium, 99)),
                )
            })
            .await;
        assert!(matches!(result, Err(StoreError::Invariant(_))));
        let chat = store.chat(ChatId(1)).await.unwrap().unwrap();
        assert!(!chat.co2_active);
    }

    #[tokio::test]
    async fn unavailable_store_fails_fast() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result = store
            .transact(scope().user(UserId(1)), |_| Ok::<_, StoreError>(Commit::new(())))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
        store.set_unavailable(false);
        assert!(store.user(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_transactions_serialize_per_row() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .transact(scope().user(UserId(1)), |_| {
                        Ok::<_, StoreError>(
                            Commit::new(())
                                .user(UserId(1), UserPatch::new().credit(Currency::Primary, 1)),
                        )
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let user = store.user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.primary, 150);
    }

    #[tokio::test]
    async fn histories_are_newest_first() {
        let store = MemoryStore::new();
        for amount in 1..=3 {
            store
                .transact(scope().user(UserId(1)), |_| {
                    Ok::<_, StoreError>(Commit::new(()).log(MiningEvent::new(
                        UserId(1),
                        MiningAction::Mining,
                        amount,
                        Utc::now(),
                    )))
                })
                .await
                .unwrap();
        }
        let history = store.mining_history(UserId(1), 2).await.unwrap();
        let amounts: Vec<i64> = history.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![3, 2]);
    }
}
