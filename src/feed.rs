//! Authorization-filtered change feed.
//!
//! Writes append their changes to `change_log` inside the writing transaction and
//! publish them on a broadcast channel after commit. A [`Subscription`] replays the
//! log from a checkpoint, then follows the channel. Every change is re-checked
//! against the subscriber's read policy when it is delivered.

use std::collections::{HashSet, VecDeque};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Entity, IdentityId, Row};
use crate::policy::{self, Operation};
use crate::store::Store;

const REPLAY_BATCH: i64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Position in commit order. Doubles as the resume checkpoint.
    pub seq: i64,
    pub entity: Entity,
    pub kind: ChangeKind,
    /// Conversation the row belonged to when the change committed.
    pub conversation_id: Option<Uuid>,
    pub old: Option<Row>,
    pub new: Option<Row>,
    #[serde(with = "time::serde::rfc3339")]
    pub committed_at: OffsetDateTime,
}

impl Change {
    /// The row as it is after the change, or as it was before a delete.
    pub fn row(&self) -> Option<&Row> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

#[derive(FromRow)]
struct LogRow {
    seq: i64,
    entity: Entity,
    kind: ChangeKind,
    conversation_id: Option<Uuid>,
    old_row: Option<String>,
    new_row: Option<String>,
    committed_at: OffsetDateTime,
}

impl TryFrom<LogRow> for Change {
    type Error = Error;

    fn try_from(row: LogRow) -> Result<Change> {
        Ok(Change {
            seq: row.seq,
            entity: row.entity,
            kind: row.kind,
            conversation_id: row.conversation_id,
            old: row.old_row.as_deref().map(serde_json::from_str).transpose()?,
            new: row.new_row.as_deref().map(serde_json::from_str).transpose()?,
            committed_at: row.committed_at,
        })
    }
}

/// Holds the pool and a receiver but no sender, so the feed ends once every
/// [`Store`] handle is dropped.
pub struct Subscription {
    pool: SqlitePool,
    caller: IdentityId,
    entities: HashSet<Entity>,
    last_seq: i64,
    catching_up: bool,
    backlog: VecDeque<Change>,
    live: broadcast::Receiver<Change>,
}

impl Store {
    /// Subscribes `caller` to changes on `entities`.
    ///
    /// With `after`, changes committed after that sequence number are replayed
    /// from the log first. Without it the subscription starts at the head.
    pub async fn subscribe(
        &self,
        caller: IdentityId,
        entities: &[Entity],
        after: Option<i64>,
    ) -> Result<Subscription> {
        // Join the channel before reading the head so nothing slips between.
        let live = self.live();
        let (last_seq, catching_up) = match after {
            Some(seq) => (seq, true),
            None => {
                let head: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM change_log")
                    .fetch_one(self.pool())
                    .await?;
                (head, false)
            }
        };
        let entities = entities
            .iter()
            .copied()
            .filter(Entity::is_published)
            .collect();
        debug!(%caller, last_seq, "subscribed");
        Ok(Subscription {
            pool: self.pool().clone(),
            caller,
            entities,
            last_seq,
            catching_up,
            backlog: VecDeque::new(),
            live,
        })
    }
}

impl Subscription {
    pub fn caller(&self) -> IdentityId {
        self.caller
    }

    /// Sequence number of the last change examined, delivered or not.
    pub fn checkpoint(&self) -> i64 {
        self.last_seq
    }

    /// Waits for the next change the subscriber is allowed to see.
    /// `None` once every `Store` handle is dropped.
    pub async fn next(&mut self) -> Result<Option<Change>> {
        loop {
            if self.backlog.is_empty() && self.catching_up {
                self.replay().await?;
            }
            let change = match self.backlog.pop_front() {
                Some(change) => change,
                None => match self.live.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(caller = %self.caller, missed, "feed lagged, replaying from log");
                        self.catching_up = true;
                        continue;
                    }
                    Err(RecvError::Closed) => return Ok(None),
                },
            };
            if change.seq <= self.last_seq {
                continue;
            }
            let admitted = match self.admits(&change).await {
                Ok(admitted) => admitted,
                Err(err) => {
                    // Resume from the log at the change that failed.
                    self.backlog.clear();
                    self.catching_up = true;
                    return Err(err);
                }
            };
            self.last_seq = change.seq;
            if admitted {
                return Ok(Some(change));
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Change>> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            match sub.next().await {
                Ok(Some(change)) => Some((Ok(change), sub)),
                Ok(None) => None,
                Err(err) => Some((Err(err), sub)),
            }
        })
    }

    async fn replay(&mut self) -> Result<()> {
        let rows: Vec<LogRow> =
            sqlx::query_as("SELECT * FROM change_log WHERE seq > ? ORDER BY seq LIMIT ?")
                .bind(self.last_seq)
                .bind(REPLAY_BATCH)
                .fetch_all(&self.pool)
                .await?;
        self.catching_up = rows.len() as i64 == REPLAY_BATCH;
        for row in rows {
            self.backlog.push_back(Change::try_from(row)?);
        }
        Ok(())
    }

    async fn admits(&self, change: &Change) -> Result<bool> {
        if !self.entities.contains(&change.entity) {
            return Ok(false);
        }
        let Some(row) = change.row() else {
            return Ok(false);
        };
        let mut conn = self.pool.acquire().await?;
        policy::permits_scoped(
            &mut conn,
            self.caller,
            Operation::Select,
            row,
            change.conversation_id,
        )
        .await
    }
}
