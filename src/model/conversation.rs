use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub is_group: bool,
    /// Nulled when the creator's identity goes away.
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConversation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    pub created_by: Uuid,
}

impl NewConversation {
    pub fn private(created_by: Uuid) -> Self {
        NewConversation {
            created_by,
            ..Default::default()
        }
    }

    pub fn group(created_by: Uuid, name: impl Into<String>) -> Self {
        NewConversation {
            name: Some(name.into()),
            is_group: true,
            created_by,
            ..Default::default()
        }
    }
}
