use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Profile {
    /// Same value as the identity id.
    pub id: Uuid,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Profile {
    pub fn blank(id: Uuid, now: OffsetDateTime) -> Self {
        Profile {
            id,
            handle: None,
            display_name: None,
            avatar_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Signup event from the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityCreated {
    pub id: Uuid,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}
