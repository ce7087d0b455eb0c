use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub identity_id: Uuid,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMembership {
    pub conversation_id: Uuid,
    pub identity_id: Uuid,
    #[serde(default)]
    pub role: Role,
}

impl NewMembership {
    pub fn member(conversation_id: Uuid, identity_id: Uuid) -> Self {
        NewMembership {
            conversation_id,
            identity_id,
            role: Role::Member,
        }
    }
}
