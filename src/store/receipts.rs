use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::feed::ChangeKind;
use crate::model::{IdentityId, NewReadReceipt, ReadReceipt, Row};
use crate::policy::{self, Operation};

use super::{Store, visible};

async fn insert_row(conn: &mut SqliteConnection, r: &ReadReceipt) -> Result<()> {
    sqlx::query("INSERT INTO read_receipts (id,message_id,identity_id,read_at) VALUES (?,?,?,?)")
        .bind(r.id)
        .bind(r.message_id)
        .bind(r.identity_id)
        .bind(r.read_at)
        .execute(conn)
        .await?;
    Ok(())
}

impl Store {
    pub async fn mark_read(&self, caller: IdentityId, new: NewReadReceipt) -> Result<ReadReceipt> {
        let mut receipts = self.mark_read_many(caller, vec![new]).await?;
        Ok(receipts.remove(0))
    }

    /// Inserts several receipts at once. Every one must be allowed or none is
    /// written.
    pub async fn mark_read_many(
        &self,
        caller: IdentityId,
        new: Vec<NewReadReceipt>,
    ) -> Result<Vec<ReadReceipt>> {
        let mut w = self.begin().await?;
        let receipts: Vec<ReadReceipt> = new
            .into_iter()
            .map(|r| ReadReceipt {
                id: Uuid::now_v7(),
                message_id: r.message_id,
                identity_id: r.identity_id,
                read_at: w.now,
            })
            .collect();

        for receipt in &receipts {
            policy::authorize(w.conn(), caller, Operation::Insert, &receipt.clone().into()).await?;
        }
        for receipt in &receipts {
            insert_row(w.conn(), receipt).await?;
            w.record(ChangeKind::Insert, None, Some(Row::from(receipt.clone())))
                .await?;
        }
        w.commit().await?;

        debug!(%caller, count = receipts.len(), "marked read");
        Ok(receipts)
    }

    pub async fn list_receipts(&self, caller: IdentityId, message_id: Uuid) -> Result<Vec<ReadReceipt>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as("SELECT * FROM read_receipts WHERE message_id = ? ORDER BY id")
            .bind(message_id)
            .fetch_all(&mut *tx)
            .await?;
        visible(&mut tx, caller, rows).await
    }

    /// Moves the read time of the caller's own receipt.
    pub async fn update_receipt(&self, caller: IdentityId, receipt: ReadReceipt) -> Result<ReadReceipt> {
        let mut w = self.begin().await?;
        let old: ReadReceipt = w.load(caller, Operation::Update, receipt.id).await?;
        let new = ReadReceipt {
            read_at: receipt.read_at,
            ..old.clone()
        };

        sqlx::query("UPDATE read_receipts SET read_at = ? WHERE id = ?")
            .bind(new.read_at)
            .bind(new.id)
            .execute(w.conn())
            .await?;
        w.record(ChangeKind::Update, Some(old.into()), Some(new.clone().into()))
            .await?;
        w.commit().await?;
        Ok(new)
    }
}
