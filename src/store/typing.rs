use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::feed::ChangeKind;
use crate::model::{IdentityId, NewTypingStatus, TypingStatus};
use crate::policy::{self, Operation};
use crate::triggers;

use super::{Store, Write, visible};

async fn insert(w: &mut Write<'_>, caller: IdentityId, new: NewTypingStatus) -> Result<TypingStatus> {
    let status = TypingStatus {
        id: Uuid::now_v7(),
        conversation_id: new.conversation_id,
        identity_id: new.identity_id,
        is_typing: new.is_typing,
        updated_at: w.now,
    };
    policy::authorize(w.conn(), caller, Operation::Insert, &status.clone().into()).await?;
    sqlx::query("INSERT INTO typing_status (id,conversation_id,identity_id,is_typing,updated_at) VALUES (?,?,?,?,?)")
        .bind(status.id)
        .bind(status.conversation_id)
        .bind(status.identity_id)
        .bind(status.is_typing)
        .bind(status.updated_at)
        .execute(w.conn())
        .await?;
    w.record(ChangeKind::Insert, None, Some(status.clone().into()))
        .await?;
    Ok(status)
}

async fn update(w: &mut Write<'_>, caller: IdentityId, id: Uuid, is_typing: bool) -> Result<TypingStatus> {
    let old: TypingStatus = w.load(caller, Operation::Update, id).await?;
    let mut new = TypingStatus {
        is_typing,
        ..old.clone()
    };
    triggers::before_update(w, &old, &mut new);
    sqlx::query("UPDATE typing_status SET is_typing = ?, updated_at = ? WHERE id = ?")
        .bind(new.is_typing)
        .bind(new.updated_at)
        .bind(new.id)
        .execute(w.conn())
        .await?;
    w.record(ChangeKind::Update, Some(old.into()), Some(new.clone().into()))
        .await?;
    Ok(new)
}

impl Store {
    pub async fn insert_typing(&self, caller: IdentityId, new: NewTypingStatus) -> Result<TypingStatus> {
        let mut w = self.begin().await?;
        let status = insert(&mut w, caller, new).await?;
        w.commit().await?;
        Ok(status)
    }

    pub async fn update_typing(&self, caller: IdentityId, status: TypingStatus) -> Result<TypingStatus> {
        let mut w = self.begin().await?;
        let status = update(&mut w, caller, status.id, status.is_typing).await?;
        w.commit().await?;
        Ok(status)
    }

    /// Writes the caller's typing cell for a conversation, creating it on first use.
    pub async fn set_typing(
        &self,
        caller: IdentityId,
        conversation_id: Uuid,
        is_typing: bool,
    ) -> Result<TypingStatus> {
        let mut w = self.begin().await?;
        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM typing_status WHERE conversation_id = ? AND identity_id = ?",
        )
        .bind(conversation_id)
        .bind(caller)
        .fetch_optional(w.conn())
        .await?;
        let status = match existing {
            Some(id) => update(&mut w, caller, id, is_typing).await?,
            None => {
                let new = NewTypingStatus {
                    conversation_id,
                    identity_id: caller,
                    is_typing,
                };
                insert(&mut w, caller, new).await?
            }
        };
        w.commit().await?;

        debug!(conversation = %conversation_id, %caller, is_typing, "typing");
        Ok(status)
    }

    pub async fn list_typing(&self, caller: IdentityId, conversation_id: Uuid) -> Result<Vec<TypingStatus>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as(
            "SELECT * FROM typing_status WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await?;
        visible(&mut tx, caller, rows).await
    }
}
