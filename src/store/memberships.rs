use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::feed::ChangeKind;
use crate::model::{IdentityId, Membership, NewMembership, Role};
use crate::policy::{self, Operation};

use super::{Store, visible};

pub(crate) async fn insert_row(conn: &mut SqliteConnection, m: &Membership) -> Result<()> {
    sqlx::query("INSERT INTO memberships (id,conversation_id,identity_id,role,joined_at) VALUES (?,?,?,?,?)")
        .bind(m.id)
        .bind(m.conversation_id)
        .bind(m.identity_id)
        .bind(m.role)
        .bind(m.joined_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Admins only exist in group conversations. A missing conversation is left to
/// the foreign key.
async fn check_role(conn: &mut SqliteConnection, conversation_id: Uuid, role: Role) -> Result<()> {
    if role != Role::Admin {
        return Ok(());
    }
    let is_group: Option<bool> = sqlx::query_scalar("SELECT is_group FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .fetch_optional(conn)
        .await?;
    match is_group {
        Some(false) => Err(Error::invalid("admin role requires a group conversation")),
        _ => Ok(()),
    }
}

impl Store {
    /// Self-join: the caller inserts their own membership.
    pub async fn join_conversation(
        &self,
        caller: IdentityId,
        new: NewMembership,
    ) -> Result<Membership> {
        let mut w = self.begin().await?;
        let membership = Membership {
            id: Uuid::now_v7(),
            conversation_id: new.conversation_id,
            identity_id: new.identity_id,
            role: new.role,
            joined_at: w.now,
        };
        policy::authorize(w.conn(), caller, Operation::Insert, &membership.clone().into()).await?;
        check_role(w.conn(), membership.conversation_id, membership.role).await?;

        insert_row(w.conn(), &membership).await?;
        w.record(ChangeKind::Insert, None, Some(membership.clone().into()))
            .await?;
        w.commit().await?;

        debug!(conversation = %membership.conversation_id, identity = %membership.identity_id, "joined");
        Ok(membership)
    }

    pub async fn get_membership(
        &self,
        caller: IdentityId,
        conversation_id: Uuid,
        identity_id: IdentityId,
    ) -> Result<Option<Membership>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as(
            "SELECT * FROM memberships WHERE conversation_id = ? AND identity_id = ?",
        )
        .bind(conversation_id)
        .bind(identity_id)
        .fetch_all(&mut *tx)
        .await?;
        Ok(visible(&mut tx, caller, rows).await?.into_iter().next())
    }

    pub async fn list_members(
        &self,
        caller: IdentityId,
        conversation_id: Uuid,
    ) -> Result<Vec<Membership>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as(
            "SELECT * FROM memberships WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await?;
        visible(&mut tx, caller, rows).await
    }

    /// Role change, admins only.
    pub async fn update_membership(
        &self,
        caller: IdentityId,
        id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        let mut w = self.begin().await?;
        let old: Membership = w.load(caller, Operation::Update, id).await?;
        check_role(w.conn(), old.conversation_id, role).await?;
        let new = Membership { role, ..old.clone() };

        sqlx::query("UPDATE memberships SET role = ? WHERE id = ?")
            .bind(new.role)
            .bind(new.id)
            .execute(w.conn())
            .await?;
        w.record(ChangeKind::Update, Some(old.into()), Some(new.clone().into()))
            .await?;
        w.commit().await?;

        debug!(id = %new.id, role = ?new.role, "membership updated");
        Ok(new)
    }

    /// Leaving (own membership) or removal by an admin.
    pub async fn remove_membership(&self, caller: IdentityId, id: Uuid) -> Result<Membership> {
        let mut w = self.begin().await?;
        let old: Membership = w.load(caller, Operation::Delete, id).await?;

        sqlx::query("DELETE FROM memberships WHERE id = ?")
            .bind(old.id)
            .execute(w.conn())
            .await?;
        w.record(ChangeKind::Delete, Some(old.clone().into()), None)
            .await?;
        w.commit().await?;

        debug!(conversation = %old.conversation_id, identity = %old.identity_id, "membership removed");
        Ok(old)
    }
}
