mod conversations;
mod identities;
mod memberships;
mod messages;
mod profiles;
mod receipts;
mod typing;

use std::str::FromStr;
use std::sync::Arc;

use sqlx::{
    Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{Change, ChangeKind};
use crate::model::{IdentityId, Record, Row};
use crate::policy::{self, Operation};
use crate::res::SCHEMA;

pub(crate) use memberships::insert_row as insert_membership;
pub(crate) use profiles::insert_row as insert_profile;

const DEFAULT_FEED_CAPACITY: usize = 256;

pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Entity store with authorization, invariant hooks and the change feed wired
/// into every write.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    gate: Arc<Mutex<()>>,
    feed: broadcast::Sender<Change>,
}

impl Store {
    pub async fn open(config: &Config) -> Result<Store> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        info!(url = %config.database_url, "opened store");
        Store::from_pool(pool, config.feed_capacity).await
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Store> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Store::from_pool(pool, DEFAULT_FEED_CAPACITY).await
    }

    pub async fn from_pool(pool: SqlitePool, feed_capacity: usize) -> Result<Store> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Store {
            pool,
            gate: Arc::new(Mutex::new(())),
            feed: broadcast::channel(feed_capacity.max(1)).0,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn live(&self) -> broadcast::Receiver<Change> {
        self.feed.subscribe()
    }

    /// Read snapshot. Dropped without commit.
    pub(crate) async fn read(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub(crate) async fn begin(&self) -> Result<Write<'_>> {
        let gate = self.gate.lock().await;
        let tx = self.pool.begin().await?;
        Ok(Write {
            store: self,
            _gate: gate,
            tx,
            pending: Vec::new(),
            now: now(),
        })
    }

    /// Single-row read: `None` for missing rows and for rows the caller may not see.
    pub async fn get<T: Record>(&self, caller: IdentityId, id: Uuid) -> Result<Option<T>> {
        let mut tx = self.read().await?;
        let Some(row) = fetch::<T>(&mut tx, id).await? else {
            return Ok(None);
        };
        let visible = policy::permits(&mut tx, caller, Operation::Select, &row.clone().into()).await?;
        Ok(visible.then_some(row))
    }

    /// Trims feed history at or below `seq`.
    pub async fn prune_change_log(&self, seq: i64) -> Result<u64> {
        let _gate = self.gate.lock().await;
        let done = sqlx::query("DELETE FROM change_log WHERE seq <= ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        debug!(seq, removed = done.rows_affected(), "pruned change log");
        Ok(done.rows_affected())
    }
}

pub(crate) async fn fetch<T: Record>(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<T>> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", T::TABLE);
    let row = sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Keeps the rows the caller may read. Partial visibility filters, never errors.
pub(crate) async fn visible<T: Record>(
    conn: &mut SqliteConnection,
    caller: IdentityId,
    rows: Vec<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if policy::permits(conn, caller, Operation::Select, &row.clone().into()).await? {
            out.push(row);
        }
    }
    Ok(out)
}

struct Pending {
    kind: ChangeKind,
    scope: Option<Uuid>,
    old: Option<Row>,
    new: Option<Row>,
}

/// One serialized write: the write gate, its transaction and the changes it
/// will publish once committed.
pub(crate) struct Write<'s> {
    store: &'s Store,
    _gate: MutexGuard<'s, ()>,
    tx: Transaction<'static, Sqlite>,
    pending: Vec<Pending>,
    pub(crate) now: OffsetDateTime,
}

impl Write<'_> {
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Loads the target of an update or delete and checks the caller against it.
    /// A missing row is refused the same way as a forbidden one.
    pub(crate) async fn load<T: Record>(
        &mut self,
        caller: IdentityId,
        op: Operation,
        id: Uuid,
    ) -> Result<T> {
        let Some(row) = fetch::<T>(self.conn(), id).await? else {
            return Err(Error::AuthorizationDenied);
        };
        policy::authorize(self.conn(), caller, op, &row.clone().into()).await?;
        Ok(row)
    }

    /// Queues a change for the feed. Unpublished entities are ignored.
    pub(crate) async fn record(
        &mut self,
        kind: ChangeKind,
        old: Option<Row>,
        new: Option<Row>,
    ) -> Result<()> {
        let Some(row) = new.as_ref().or(old.as_ref()) else {
            return Ok(());
        };
        if !row.entity().is_published() {
            return Ok(());
        }
        let scope = policy::scope_of(&mut self.tx, row).await?;
        self.pending.push(Pending { kind, scope, old, new });
        Ok(())
    }

    /// Appends queued changes to the log, commits, then publishes.
    pub(crate) async fn commit(mut self) -> Result<()> {
        let mut changes = Vec::with_capacity(self.pending.len());
        for Pending { kind, scope, old, new } in std::mem::take(&mut self.pending) {
            let Some(entity) = new.as_ref().or(old.as_ref()).map(Row::entity) else {
                continue;
            };
            let old_json = old.as_ref().map(serde_json::to_string).transpose()?;
            let new_json = new.as_ref().map(serde_json::to_string).transpose()?;
            let seq = sqlx::query(
                "INSERT INTO change_log (entity,kind,conversation_id,old_row,new_row,committed_at) VALUES (?,?,?,?,?,?)",
            )
            .bind(entity)
            .bind(kind)
            .bind(scope)
            .bind(old_json)
            .bind(new_json)
            .bind(self.now)
            .execute(&mut *self.tx)
            .await?
            .last_insert_rowid();

            changes.push(Change {
                seq,
                entity,
                kind,
                conversation_id: scope,
                old,
                new,
                committed_at: self.now,
            });
        }

        self.tx.commit().await?;

        // Still under the gate, so the channel sees commit order.
        for change in changes {
            let _ = self.store.feed.send(change);
        }
        Ok(())
    }
}
