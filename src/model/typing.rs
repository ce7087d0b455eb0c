use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One mutable cell per (conversation, identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TypingStatus {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub identity_id: Uuid,
    pub is_typing: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTypingStatus {
    pub conversation_id: Uuid,
    pub identity_id: Uuid,
    pub is_typing: bool,
}
