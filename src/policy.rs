//! Row-level authorization.
//!
//! Every `(entity, operation)` pair maps to at most one [`Policy`]; a pair with
//! no entry is forbidden. A policy combines [`Rule`]s, each a boolean over the
//! caller, the row and the caller's membership in the row's conversation.

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Entity, IdentityId, Role, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Anyone,
    /// Caller is the identity that owns the row (see [`Row::owner`]).
    Owner,
    /// Caller has a membership in the row's conversation.
    Member,
    /// Caller has an admin membership in the row's conversation.
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    AnyOf(&'static [Rule]),
    AllOf(&'static [Rule]),
}

pub fn policy(entity: Entity, op: Operation) -> Option<Policy> {
    use Operation as Op;
    use Policy::{AllOf, AnyOf};
    use Rule as R;

    let policy = match (entity, op) {
        (Entity::Profile, Op::Select) => AnyOf(&[R::Anyone]),
        (Entity::Profile, Op::Insert | Op::Update) => AnyOf(&[R::Owner]),

        (Entity::Conversation, Op::Select) => AnyOf(&[R::Member]),
        (Entity::Conversation, Op::Insert) => AnyOf(&[R::Owner]),
        (Entity::Conversation, Op::Update) => AnyOf(&[R::Owner, R::Admin]),

        (Entity::Membership, Op::Select) => AnyOf(&[R::Member]),
        (Entity::Membership, Op::Insert) => AnyOf(&[R::Owner]),
        (Entity::Membership, Op::Update) => AnyOf(&[R::Admin]),
        (Entity::Membership, Op::Delete) => AnyOf(&[R::Owner, R::Admin]),

        (Entity::Message, Op::Select) => AnyOf(&[R::Member]),
        (Entity::Message, Op::Insert) => AllOf(&[R::Owner, R::Member]),
        (Entity::Message, Op::Update | Op::Delete) => AnyOf(&[R::Owner]),

        (Entity::ReadReceipt | Entity::TypingStatus, Op::Select) => AnyOf(&[R::Member]),
        (Entity::ReadReceipt | Entity::TypingStatus, Op::Insert | Op::Update) => {
            AnyOf(&[R::Owner])
        }

        _ => return None,
    };
    Some(policy)
}

/// Resolves the conversation a row is scoped to against current store state.
pub(crate) async fn scope_of(conn: &mut SqliteConnection, row: &Row) -> Result<Option<Uuid>> {
    match row {
        Row::ReadReceipt(receipt) => {
            let scope = sqlx::query_scalar("SELECT conversation_id FROM messages WHERE id = ?")
                .bind(receipt.message_id)
                .fetch_optional(conn)
                .await?;
            Ok(scope)
        }
        other => Ok(other.conversation_id()),
    }
}

pub(crate) async fn role_in(
    conn: &mut SqliteConnection,
    conversation_id: Uuid,
    identity_id: IdentityId,
) -> Result<Option<Role>> {
    let role = sqlx::query_scalar(
        "SELECT role FROM memberships WHERE conversation_id = ? AND identity_id = ?",
    )
    .bind(conversation_id)
    .bind(identity_id)
    .fetch_optional(conn)
    .await?;
    Ok(role)
}

async fn holds(
    conn: &mut SqliteConnection,
    caller: IdentityId,
    rule: Rule,
    row: &Row,
    scope: Option<Uuid>,
) -> Result<bool> {
    Ok(match rule {
        Rule::Anyone => true,
        Rule::Owner => row.owner() == Some(caller),
        Rule::Member | Rule::Admin => {
            let Some(conversation_id) = scope else {
                return Ok(false);
            };
            match role_in(conn, conversation_id, caller).await? {
                Some(Role::Admin) => true,
                Some(Role::Member) => rule == Rule::Member,
                None => false,
            }
        }
    })
}

/// Evaluates the policy for `op` on `row` with an already resolved scope.
pub async fn permits_scoped(
    conn: &mut SqliteConnection,
    caller: IdentityId,
    op: Operation,
    row: &Row,
    scope: Option<Uuid>,
) -> Result<bool> {
    let Some(policy) = policy(row.entity(), op) else {
        return Ok(false);
    };
    match policy {
        Policy::AnyOf(rules) => {
            for rule in rules {
                if holds(conn, caller, *rule, row, scope).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Policy::AllOf(rules) => {
            for rule in rules {
                if !holds(conn, caller, *rule, row, scope).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

pub async fn permits(
    conn: &mut SqliteConnection,
    caller: IdentityId,
    op: Operation,
    row: &Row,
) -> Result<bool> {
    let scope = scope_of(conn, row).await?;
    permits_scoped(conn, caller, op, row, scope).await
}

/// Like [`permits`] but turns a refusal into [`Error::AuthorizationDenied`].
pub(crate) async fn authorize(
    conn: &mut SqliteConnection,
    caller: IdentityId,
    op: Operation,
    row: &Row,
) -> Result<()> {
    if permits(conn, caller, op, row).await? {
        return Ok(());
    }
    warn!(%caller, entity = %row.entity(), ?op, "denied");
    Err(Error::AuthorizationDenied)
}
