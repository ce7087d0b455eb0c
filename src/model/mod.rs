mod conversation;
mod membership;
mod message;
mod profile;
mod receipt;
mod typing;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, sqlite::SqliteRow};
use time::OffsetDateTime;
use uuid::Uuid;

pub use conversation::{Conversation, NewConversation};
pub use membership::{Membership, NewMembership, Role};
pub use message::{Message, MessageKind, NewMessage};
pub use profile::{IdentityCreated, Profile};
pub use receipt::{NewReadReceipt, ReadReceipt};
pub use typing::{NewTypingStatus, TypingStatus};

/// Opaque id handed out by the identity provider. A profile shares it.
pub type IdentityId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Entity {
    Profile,
    Conversation,
    Membership,
    Message,
    ReadReceipt,
    TypingStatus,
}

impl Entity {
    /// Entities whose changes are published on the feed.
    pub const FEED: [Entity; 5] = [
        Entity::Conversation,
        Entity::Membership,
        Entity::Message,
        Entity::ReadReceipt,
        Entity::TypingStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Profile => "profile",
            Entity::Conversation => "conversation",
            Entity::Membership => "membership",
            Entity::Message => "message",
            Entity::ReadReceipt => "read_receipt",
            Entity::TypingStatus => "typing_status",
        }
    }

    pub fn is_published(&self) -> bool {
        Self::FEED.contains(self)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "profile" => Entity::Profile,
            "conversation" => Entity::Conversation,
            "membership" => Entity::Membership,
            "message" => Entity::Message,
            "read_receipt" => Entity::ReadReceipt,
            "typing_status" => Entity::TypingStatus,
            _ => return Err(format!("unknown entity {s}")),
        })
    }
}

/// Any stored row, tagged by entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "row", rename_all = "snake_case")]
pub enum Row {
    Profile(Profile),
    Conversation(Conversation),
    Membership(Membership),
    Message(Message),
    ReadReceipt(ReadReceipt),
    TypingStatus(TypingStatus),
}

impl Row {
    pub fn entity(&self) -> Entity {
        match self {
            Row::Profile(_) => Entity::Profile,
            Row::Conversation(_) => Entity::Conversation,
            Row::Membership(_) => Entity::Membership,
            Row::Message(_) => Entity::Message,
            Row::ReadReceipt(_) => Entity::ReadReceipt,
            Row::TypingStatus(_) => Entity::TypingStatus,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Row::Profile(r) => r.id,
            Row::Conversation(r) => r.id,
            Row::Membership(r) => r.id,
            Row::Message(r) => r.id,
            Row::ReadReceipt(r) => r.id,
            Row::TypingStatus(r) => r.id,
        }
    }

    /// The identity a row belongs to: the profile itself, the creator of a
    /// conversation, the sender of a message, the subject of the rest.
    pub fn owner(&self) -> Option<IdentityId> {
        match self {
            Row::Profile(r) => Some(r.id),
            Row::Conversation(r) => r.created_by,
            Row::Membership(r) => Some(r.identity_id),
            Row::Message(r) => Some(r.sender_id),
            Row::ReadReceipt(r) => Some(r.identity_id),
            Row::TypingStatus(r) => Some(r.identity_id),
        }
    }

    /// Conversation a row is scoped to, when the row names it directly.
    /// Read receipts only name a message and are resolved by the policy layer.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Row::Profile(_) | Row::ReadReceipt(_) => None,
            Row::Conversation(r) => Some(r.id),
            Row::Membership(r) => Some(r.conversation_id),
            Row::Message(r) => Some(r.conversation_id),
            Row::TypingStatus(r) => Some(r.conversation_id),
        }
    }
}

/// A stored entity row, as seen by the generic store and hook plumbing.
pub trait Record: Clone + Into<Row> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    const ENTITY: Entity;
    const TABLE: &'static str;

    fn id(&self) -> Uuid;

    fn touched_at(&self) -> Option<OffsetDateTime> {
        None
    }

    fn touch(&mut self, _at: OffsetDateTime) {}
}

macro_rules! record_impl {
    ($V:ident, $table:literal) => {
        impl From<$V> for Row {
            fn from(r: $V) -> Self {
                Row::$V(r)
            }
        }

        impl Record for $V {
            const ENTITY: Entity = Entity::$V;
            const TABLE: &'static str = $table;

            fn id(&self) -> Uuid {
                self.id
            }
        }
    };
    ($V:ident, $table:literal, $stamp:ident) => {
        impl From<$V> for Row {
            fn from(r: $V) -> Self {
                Row::$V(r)
            }
        }

        impl Record for $V {
            const ENTITY: Entity = Entity::$V;
            const TABLE: &'static str = $table;

            fn id(&self) -> Uuid {
                self.id
            }

            fn touched_at(&self) -> Option<OffsetDateTime> {
                Some(self.$stamp)
            }

            fn touch(&mut self, at: OffsetDateTime) {
                self.$stamp = at;
            }
        }
    };
}

record_impl!(Profile, "profiles", updated_at);
record_impl!(Conversation, "conversations", updated_at);
record_impl!(Membership, "memberships");
record_impl!(Message, "messages", updated_at);
record_impl!(ReadReceipt, "read_receipts");
record_impl!(TypingStatus, "typing_status", updated_at);
