//! The `PostgreSQL` [`EntityStore`].
//!
//! A transaction runs in two database transactions:
//!
//! 1. A short one that inserts the scoped chat, any users marked for
//!    creation and the chat memberships, all with `ON CONFLICT DO NOTHING`,
//!    and commits. These rows persist even if the engine's closure fails.
//! 2. The locking one: `SELECT ... FOR UPDATE` on the chat, then on the users
//!    ordered by id, the closure, then the staged writes. Any error drops the
//!    transaction, which rolls back and releases the locks.
//!
//! Every lock is taken in the second phase in the same order, so concurrent
//! engine transactions wait for each other and never deadlock.

use std::future::Future;

use peatnet_core::StoreError;
use peatnet_core::store::{Commit, EntityStore, Staged, TxScope, TxView};
use peatnet_types::{CaseId, Chat, ChatId, CourtCase, HazardKind, MiningEvent, User, UserId};
use sqlx::{PgConnection, PgPool};

use crate::error::DbError;
use crate::postgres::PostgresPool;
use crate::rows::{
    CASE_COLUMNS, CHAT_COLUMNS, ChatRow, CourtCaseRow, MiningEventRow, USER_COLUMNS, UserRow,
    bigint, convert, integer,
};

fn db(err: sqlx::Error) -> StoreError {
    DbError::from(err).into()
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Entity store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store on an open pool. Migrations must already have run.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    async fn run<T, E, F>(&self, scope: TxScope, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&TxView) -> Result<Commit<T>, E>,
    {
        self.ensure_rows(&scope).await.map_err(StoreError::from)?;

        let mut tx = self.pool.begin().await.map_err(db)?;
        let view = lock_rows(&mut tx, &scope).await.map_err(StoreError::from)?;
        let mut staged = f(&view)?.stage(&view)?;
        write_staged(&mut tx, &mut staged).await.map_err(StoreError::from)?;
        tx.commit().await.map_err(db)?;

        tracing::debug!(
            users = staged.users.len(),
            chat = staged.chat.is_some(),
            mining = staged.mining.len(),
            case = staged.court_case.is_some(),
            "transaction committed"
        );
        Ok(staged.value)
    }

    /// Insert the scope's lazily created rows and memberships.
    async fn ensure_rows(&self, scope: &TxScope) -> Result<(), DbError> {
        let created: Vec<i64> = scope.created().map(i64::from).collect();
        if scope.chat_id().is_none() && created.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        if let Some(id) = scope.chat_id() {
            let fresh = Chat::new(id);
            sqlx::query("INSERT INTO chats (id, ph_level) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
                .bind(id.into_inner())
                .bind(fresh.ph_level)
                .execute(&mut *tx)
                .await?;
        }

        if !created.is_empty() {
            let seed = scope.seed();
            sqlx::query(
                r"INSERT INTO users (id, primary_balance, premium_balance, health, last_passive_income_at, last_cellulose_at, created_at)
                  SELECT id, $2, $3, $4, $5, $5, $5 FROM UNNEST($1::BIGINT[]) AS t(id)
                  ORDER BY id
                  ON CONFLICT (id) DO NOTHING",
            )
            .bind(&created)
            .bind(bigint(seed.primary))
            .bind(bigint(seed.premium))
            .bind(integer(seed.health))
            .bind(seed.at)
            .execute(&mut *tx)
            .await?;
        }

        let members: Vec<i64> = scope.members().map(i64::from).collect();
        if let Some(chat) = scope.chat_id().filter(|_| !members.is_empty()) {
            sqlx::query(
                r"INSERT INTO chat_members (chat_id, user_id)
                  SELECT $1, user_id FROM UNNEST($2::BIGINT[]) AS t(user_id)
                  ON CONFLICT DO NOTHING",
            )
            .bind(chat.into_inner())
            .bind(&members)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_user(&self, id: UserId) -> Result<Option<User>, DbError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn fetch_chat(&self, id: ChatId) -> Result<Option<Chat>, DbError> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1");
        sqlx::query_as::<_, ChatRow>(&sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?
            .map(Chat::try_from)
            .transpose()
    }

    async fn fetch_ids(&self, sql: &str) -> Result<Vec<i64>, DbError> {
        Ok(sqlx::query_scalar::<_, i64>(sql).fetch_all(&self.pool).await?)
    }

    async fn fetch_members(&self, chat: ChatId) -> Result<Vec<UserId>, DbError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_members WHERE chat_id = $1 ORDER BY user_id",
        )
        .bind(chat.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    async fn fetch_top_users(&self, n: usize) -> Result<Vec<User>, DbError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY primary_balance DESC, id ASC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn fetch_court_history(&self, user: UserId, n: usize) -> Result<Vec<CourtCase>, DbError> {
        let sql = format!(
            "SELECT {CASE_COLUMNS} FROM court_cases
             WHERE plaintiff = $1 OR defendant = $1
             ORDER BY decided_at DESC, id DESC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, CourtCaseRow>(&sql)
            .bind(user.into_inner())
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn fetch_mining_history(
        &self,
        user: UserId,
        n: usize,
    ) -> Result<Vec<MiningEvent>, DbError> {
        let rows = sqlx::query_as::<_, MiningEventRow>(
            r"SELECT user_id, action, amount, at FROM mining_events
              WHERE user_id = $1
              ORDER BY at DESC, id DESC
              LIMIT $2",
        )
        .bind(user.into_inner())
        .bind(limit(n))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn fetch_case(&self, id: CaseId) -> Result<Option<CourtCase>, DbError> {
        let sql = format!("SELECT {CASE_COLUMNS} FROM court_cases WHERE id = $1");
        sqlx::query_as::<_, CourtCaseRow>(&sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?
            .map(CourtCase::try_from)
            .transpose()
    }
}

/// Lock the scoped chat, then the scoped users by ascending id.
async fn lock_rows(conn: &mut PgConnection, scope: &TxScope) -> Result<TxView, DbError> {
    let chat = match scope.chat_id() {
        Some(id) => {
            let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1 FOR UPDATE");
            let row = sqlx::query_as::<_, ChatRow>(&sql)
                .bind(id.into_inner())
                .fetch_optional(&mut *conn)
                .await?;
            row.map(Chat::try_from).transpose()?
        }
        None => None,
    };

    let ids: Vec<i64> = scope.lock_order().into_iter().map(i64::from).collect();
    let users = if ids.is_empty() {
        Vec::new()
    } else {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await?;
        convert(rows)?
    };

    Ok(TxView::new(chat, users))
}

/// Write every staged row and log record.
async fn write_staged<T>(conn: &mut PgConnection, staged: &mut Staged<T>) -> Result<(), DbError> {
    for user in &staged.users {
        sqlx::query(
            r"UPDATE users SET
                primary_balance = $2,
                premium_balance = $3,
                health = $4,
                warnings = $5,
                perforation_count = $6,
                is_banned = $7,
                banned_until = $8,
                last_passive_income_at = $9,
                last_cellulose_at = $10
              WHERE id = $1",
        )
        .bind(user.id.into_inner())
        .bind(bigint(user.primary))
        .bind(bigint(user.premium))
        .bind(integer(user.health))
        .bind(integer(user.warnings))
        .bind(integer(user.perforation_count))
        .bind(user.is_banned)
        .bind(user.banned_until)
        .bind(user.last_passive_income_at)
        .bind(user.last_cellulose_at)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(chat) = &staged.chat {
        sqlx::query(
            r"UPDATE chats SET
                ph_level = $2,
                last_danger_at = $3,
                danger_type = $4,
                turtle_active = $5,
                co2_active = $6
              WHERE id = $1",
        )
        .bind(chat.id.into_inner())
        .bind(chat.ph_level)
        .bind(chat.last_danger_at)
        .bind(chat.danger_type.map(HazardKind::as_str))
        .bind(chat.turtle_active)
        .bind(chat.co2_active)
        .execute(&mut *conn)
        .await?;
    }

    if !staged.mining.is_empty() {
        let len = staged.mining.len();
        let mut users = Vec::with_capacity(len);
        let mut actions = Vec::with_capacity(len);
        let mut amounts = Vec::with_capacity(len);
        let mut times = Vec::with_capacity(len);
        for event in &staged.mining {
            users.push(event.user_id.into_inner());
            actions.push(event.action.as_str().to_owned());
            amounts.push(event.amount);
            times.push(event.at);
        }
        sqlx::query(
            r"INSERT INTO mining_events (user_id, action, amount, at)
              SELECT * FROM UNNEST($1::BIGINT[], $2::TEXT[], $3::BIGINT[], $4::TIMESTAMPTZ[])",
        )
        .bind(&users)
        .bind(&actions)
        .bind(&amounts)
        .bind(&times)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(case) = &staged.court_case {
        sqlx::query(
            r"INSERT INTO court_cases (id, plaintiff, defendant, court_type, verdict, fine, result, decided_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(case.id.into_inner())
        .bind(case.plaintiff.into_inner())
        .bind(case.defendant.into_inner())
        .bind(case.court_type.as_str())
        .bind(case.verdict.as_str())
        .bind(bigint(case.fine))
        .bind(&case.result)
        .bind(case.decided_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

impl EntityStore for PostgresStore {
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
        async move { self.fetch_user(id).await.map_err(StoreError::from) }
    }

    fn chat(&self, id: ChatId) -> impl Future<Output = Result<Option<Chat>, StoreError>> + Send {
        async move { self.fetch_chat(id).await.map_err(StoreError::from) }
    }

    fn chat_ids(&self) -> impl Future<Output = Result<Vec<ChatId>, StoreError>> + Send {
        async move {
            let ids = self
                .fetch_ids("SELECT id FROM chats ORDER BY id")
                .await
                .map_err(StoreError::from)?;
            Ok(ids.into_iter().map(ChatId).collect())
        }
    }

    fn user_ids(&self) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send {
        async move {
            let ids = self
                .fetch_ids("SELECT id FROM users ORDER BY id")
                .await
                .map_err(StoreError::from)?;
            Ok(ids.into_iter().map(UserId).collect())
        }
    }

    fn chat_members(
        &self,
        chat: ChatId,
    ) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send {
        async move { self.fetch_members(chat).await.map_err(StoreError::from) }
    }

    fn top_users(&self, limit: usize) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send {
        async move { self.fetch_top_users(limit).await.map_err(StoreError::from) }
    }

    fn court_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CourtCase>, StoreError>> + Send {
        async move { self.fetch_court_history(user, limit).await.map_err(StoreError::from) }
    }

    fn mining_history(
        &self,
        user: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MiningEvent>, StoreError>> + Send {
        async move { self.fetch_mining_history(user, limit).await.map_err(StoreError::from) }
    }

    fn court_case(
        &self,
        id: CaseId,
    ) -> impl Future<Output = Result<Option<CourtCase>, StoreError>> + Send {
        async move { self.fetch_case(id).await.map_err(StoreError::from) }
    }
}
