use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::feed::ChangeKind;
use crate::model::{IdentityId, Message, NewMessage};
use crate::policy::{self, Operation};
use crate::triggers;

use super::{Store, Write, visible};

async fn insert_row(conn: &mut SqliteConnection, m: &Message) -> Result<()> {
    sqlx::query("INSERT INTO messages (id,conversation_id,sender_id,content,kind,file_url,reply_to_id,is_deleted,created_at,updated_at) VALUES (?,?,?,?,?,?,?,?,?,?)")
        .bind(m.id)
        .bind(m.conversation_id)
        .bind(m.sender_id)
        .bind(&m.content)
        .bind(m.kind)
        .bind(&m.file_url)
        .bind(m.reply_to_id)
        .bind(m.is_deleted)
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

async fn save(w: &mut Write<'_>, old: Message, mut new: Message) -> Result<Message> {
    triggers::before_update(w, &old, &mut new);
    sqlx::query("UPDATE messages SET content=?, kind=?, file_url=?, reply_to_id=?, is_deleted=?, updated_at=? WHERE id=?")
        .bind(&new.content)
        .bind(new.kind)
        .bind(&new.file_url)
        .bind(new.reply_to_id)
        .bind(new.is_deleted)
        .bind(new.updated_at)
        .bind(new.id)
        .execute(w.conn())
        .await?;
    w.record(ChangeKind::Update, Some(old.into()), Some(new.clone().into()))
        .await?;
    Ok(new)
}

impl Store {
    pub async fn send_message(&self, caller: IdentityId, new: NewMessage) -> Result<Message> {
        let mut w = self.begin().await?;
        let message = Message {
            id: Uuid::now_v7(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            file_url: new.file_url,
            reply_to_id: new.reply_to_id,
            is_deleted: false,
            created_at: w.now,
            updated_at: w.now,
        };
        policy::authorize(w.conn(), caller, Operation::Insert, &message.clone().into()).await?;

        insert_row(w.conn(), &message).await?;
        w.record(ChangeKind::Insert, None, Some(message.clone().into()))
            .await?;
        w.commit().await?;

        debug!(id = %message.id, conversation = %message.conversation_id, "message sent");
        Ok(message)
    }

    pub async fn get_message(&self, caller: IdentityId, id: Uuid) -> Result<Option<Message>> {
        self.get(caller, id).await
    }

    /// Messages of a conversation in send order, soft-deleted ones included.
    pub async fn list_messages(
        &self,
        caller: IdentityId,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await?;
        visible(&mut tx, caller, rows).await
    }

    /// Edits content, kind, attachment, reply target or the delete flag.
    pub async fn update_message(&self, caller: IdentityId, message: Message) -> Result<Message> {
        let mut w = self.begin().await?;
        let old: Message = w.load(caller, Operation::Update, message.id).await?;
        let new = Message {
            id: old.id,
            conversation_id: old.conversation_id,
            sender_id: old.sender_id,
            created_at: old.created_at,
            ..message
        };
        let new = save(&mut w, old, new).await?;
        w.commit().await?;

        debug!(id = %new.id, "message updated");
        Ok(new)
    }

    /// Soft delete: the row stays, flagged.
    pub async fn delete_message(&self, caller: IdentityId, id: Uuid) -> Result<Message> {
        let mut w = self.begin().await?;
        let old: Message = w.load(caller, Operation::Delete, id).await?;
        let new = Message {
            is_deleted: true,
            ..old.clone()
        };
        let new = save(&mut w, old, new).await?;
        w.commit().await?;

        debug!(%id, "message deleted");
        Ok(new)
    }
}
