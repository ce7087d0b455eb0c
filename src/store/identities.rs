use tracing::info;

use crate::error::Result;
use crate::feed::ChangeKind;
use crate::model::{
    Conversation, IdentityCreated, IdentityId, Membership, Message, Profile, ReadReceipt,
    TypingStatus,
};
use crate::triggers;

use super::{Store, Write};

impl Store {
    /// Signup hook for the identity provider. Creates the identity's profile.
    pub async fn identity_created(&self, event: IdentityCreated) -> Result<Profile> {
        let mut w = self.begin().await?;
        let profile = triggers::identity_created(&mut w, &event).await?;
        w.commit().await?;
        info!(id = %profile.id, handle = ?profile.handle, "identity bootstrapped");
        Ok(profile)
    }

    /// Account removal from the identity provider. Everything hanging off the
    /// profile goes with it; conversations it created and replies to its messages
    /// lose their reference. Returns whether a profile existed.
    pub async fn identity_removed(&self, id: IdentityId) -> Result<bool> {
        let mut w = self.begin().await?;

        release_references(&mut w, id).await?;
        record_cascade(&mut w, id).await?;

        let done = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(w.conn())
            .await?;
        w.commit().await?;

        let removed = done.rows_affected() > 0;
        info!(%id, removed, "identity removed");
        Ok(removed)
    }
}

/// Nulls weak references to the identity as regular updates, so timestamps and
/// the feed see them.
async fn release_references(w: &mut Write<'_>, id: IdentityId) -> Result<()> {
    let created: Vec<Conversation> =
        sqlx::query_as("SELECT * FROM conversations WHERE created_by = ?")
            .bind(id)
            .fetch_all(w.conn())
            .await?;
    for old in created {
        let mut new = Conversation {
            created_by: None,
            ..old.clone()
        };
        triggers::before_update(w, &old, &mut new);
        sqlx::query("UPDATE conversations SET created_by = NULL, updated_at = ? WHERE id = ?")
            .bind(new.updated_at)
            .bind(new.id)
            .execute(w.conn())
            .await?;
        w.record(ChangeKind::Update, Some(old.into()), Some(new.into()))
            .await?;
    }

    let replies: Vec<Message> = sqlx::query_as(
        "SELECT r.* FROM messages r JOIN messages m ON r.reply_to_id = m.id WHERE m.sender_id = ? AND r.sender_id != ?",
    )
    .bind(id)
    .bind(id)
    .fetch_all(w.conn())
    .await?;
    for old in replies {
        let mut new = Message {
            reply_to_id: None,
            ..old.clone()
        };
        triggers::before_update(w, &old, &mut new);
        sqlx::query("UPDATE messages SET reply_to_id = NULL, updated_at = ? WHERE id = ?")
            .bind(new.updated_at)
            .bind(new.id)
            .execute(w.conn())
            .await?;
        w.record(ChangeKind::Update, Some(old.into()), Some(new.into()))
            .await?;
    }
    Ok(())
}

/// Queues delete events for the rows the profile delete will cascade to.
async fn record_cascade(w: &mut Write<'_>, id: IdentityId) -> Result<()> {
    let receipts: Vec<ReadReceipt> = sqlx::query_as(
        "SELECT * FROM read_receipts WHERE identity_id = ? OR message_id IN (SELECT id FROM messages WHERE sender_id = ?)",
    )
    .bind(id)
    .bind(id)
    .fetch_all(w.conn())
    .await?;
    let messages: Vec<Message> = sqlx::query_as("SELECT * FROM messages WHERE sender_id = ?")
        .bind(id)
        .fetch_all(w.conn())
        .await?;
    let typing: Vec<TypingStatus> =
        sqlx::query_as("SELECT * FROM typing_status WHERE identity_id = ?")
            .bind(id)
            .fetch_all(w.conn())
            .await?;
    let memberships: Vec<Membership> =
        sqlx::query_as("SELECT * FROM memberships WHERE identity_id = ?")
            .bind(id)
            .fetch_all(w.conn())
            .await?;

    for row in receipts {
        w.record(ChangeKind::Delete, Some(row.into()), None).await?;
    }
    for row in messages {
        w.record(ChangeKind::Delete, Some(row.into()), None).await?;
    }
    for row in typing {
        w.record(ChangeKind::Delete, Some(row.into()), None).await?;
    }
    for row in memberships {
        w.record(ChangeKind::Delete, Some(row.into()), None).await?;
    }
    Ok(())
}
