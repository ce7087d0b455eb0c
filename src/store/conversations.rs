use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::feed::ChangeKind;
use crate::model::{Conversation, IdentityId, NewConversation};
use crate::policy::{self, Operation};
use crate::triggers;

use super::{Store, visible};

/// A conversation is named iff it is a group.
fn check_name(conversation: &Conversation) -> Result<()> {
    let named = conversation
        .name
        .as_deref()
        .is_some_and(|name| !name.trim().is_empty());
    match (conversation.is_group, named) {
        (true, false) => Err(Error::invalid("group conversations need a name")),
        (false, true) => Err(Error::invalid("private conversations are unnamed")),
        _ => Ok(()),
    }
}

pub(crate) async fn insert_row(conn: &mut SqliteConnection, c: &Conversation) -> Result<()> {
    sqlx::query("INSERT INTO conversations (id,name,description,avatar_url,is_group,created_by,created_at,updated_at) VALUES (?,?,?,?,?,?,?,?)")
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.description)
        .bind(&c.avatar_url)
        .bind(c.is_group)
        .bind(c.created_by)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

impl Store {
    /// Creates the conversation and, in the same transaction, the creator's
    /// membership.
    pub async fn create_conversation(
        &self,
        caller: IdentityId,
        new: NewConversation,
    ) -> Result<Conversation> {
        let mut w = self.begin().await?;
        let conversation = Conversation {
            id: Uuid::now_v7(),
            name: new.name,
            description: new.description,
            avatar_url: new.avatar_url,
            is_group: new.is_group,
            created_by: Some(new.created_by),
            created_at: w.now,
            updated_at: w.now,
        };
        policy::authorize(w.conn(), caller, Operation::Insert, &conversation.clone().into()).await?;
        check_name(&conversation)?;

        insert_row(w.conn(), &conversation).await?;
        w.record(ChangeKind::Insert, None, Some(conversation.clone().into()))
            .await?;
        triggers::after_insert_conversation(&mut w, &conversation).await?;
        w.commit().await?;

        debug!(id = %conversation.id, is_group = conversation.is_group, "conversation created");
        Ok(conversation)
    }

    pub async fn get_conversation(&self, caller: IdentityId, id: Uuid) -> Result<Option<Conversation>> {
        self.get(caller, id).await
    }

    /// Conversations the caller belongs to, most recently updated first.
    pub async fn list_conversations(&self, caller: IdentityId) -> Result<Vec<Conversation>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as(
            "SELECT c.* FROM conversations c JOIN memberships m ON m.conversation_id = c.id WHERE m.identity_id = ?",
        )
        .bind(caller)
        .fetch_all(&mut *tx)
        .await?;
        let mut rows: Vec<Conversation> = visible(&mut tx, caller, rows).await?;
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    /// Updates name, description and avatar. Group flag, creator and creation
    /// time stay as stored.
    pub async fn update_conversation(
        &self,
        caller: IdentityId,
        conversation: Conversation,
    ) -> Result<Conversation> {
        let mut w = self.begin().await?;
        let old: Conversation = w.load(caller, Operation::Update, conversation.id).await?;
        let mut new = Conversation {
            id: old.id,
            is_group: old.is_group,
            created_by: old.created_by,
            created_at: old.created_at,
            ..conversation
        };
        check_name(&new)?;
        triggers::before_update(&w, &old, &mut new);

        sqlx::query("UPDATE conversations SET name=?, description=?, avatar_url=?, updated_at=? WHERE id=?")
            .bind(&new.name)
            .bind(&new.description)
            .bind(&new.avatar_url)
            .bind(new.updated_at)
            .bind(new.id)
            .execute(w.conn())
            .await?;
        w.record(ChangeKind::Update, Some(old.into()), Some(new.clone().into()))
            .await?;
        w.commit().await?;

        debug!(id = %new.id, "conversation updated");
        Ok(new)
    }
}
