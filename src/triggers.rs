//! Derived state maintained inside the writing transaction.
//!
//! Hooks are registered per [`Trigger`] in [`hooks`] and run by the store's write
//! path after the primary write was authorized. They are not policy-checked. A
//! failing hook aborts the whole transaction as [`Error::InvariantFailure`].

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::feed::ChangeKind;
use crate::model::{
    Conversation, Entity, IdentityCreated, Membership, Profile, Record, Role,
};
use crate::store::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    BeforeUpdate(Entity),
    AfterInsert(Entity),
    /// Raised by the identity provider, not by a row write.
    IdentityCreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// `updated_at` := max(now, previous), whatever the caller sent.
    TouchUpdatedAt,
    /// The creator joins the conversation, as admin of a group.
    AutoMembership,
    /// One profile per new identity, seeded from signup metadata.
    BootstrapProfile,
}

pub fn hooks(trigger: Trigger) -> &'static [Hook] {
    match trigger {
        Trigger::BeforeUpdate(
            Entity::Profile | Entity::Conversation | Entity::Message | Entity::TypingStatus,
        ) => &[Hook::TouchUpdatedAt],
        Trigger::AfterInsert(Entity::Conversation) => &[Hook::AutoMembership],
        Trigger::IdentityCreated => &[Hook::BootstrapProfile],
        _ => &[],
    }
}

pub(crate) fn before_update<T: Record>(w: &Write<'_>, old: &T, new: &mut T) {
    for hook in hooks(Trigger::BeforeUpdate(T::ENTITY)) {
        if *hook == Hook::TouchUpdatedAt {
            let at = match old.touched_at() {
                Some(prev) if prev > w.now => prev,
                _ => w.now,
            };
            new.touch(at);
        }
    }
}

pub(crate) async fn after_insert_conversation(
    w: &mut Write<'_>,
    conversation: &Conversation,
) -> Result<()> {
    for hook in hooks(Trigger::AfterInsert(Entity::Conversation)) {
        if *hook == Hook::AutoMembership {
            auto_membership(w, conversation)
                .await
                .map_err(Error::into_invariant)?;
        }
    }
    Ok(())
}

pub(crate) async fn identity_created(w: &mut Write<'_>, event: &IdentityCreated) -> Result<Profile> {
    let mut profile = None;
    for hook in hooks(Trigger::IdentityCreated) {
        if *hook == Hook::BootstrapProfile {
            profile = Some(
                bootstrap_profile(w, event)
                    .await
                    .map_err(Error::into_invariant)?,
            );
        }
    }
    profile.ok_or_else(|| Error::InvariantFailure("no profile bootstrap registered".into()))
}

async fn auto_membership(w: &mut Write<'_>, conversation: &Conversation) -> Result<()> {
    let Some(creator) = conversation.created_by else {
        return Err(Error::InvariantFailure("conversation without creator".into()));
    };
    let role = if conversation.is_group {
        Role::Admin
    } else {
        Role::Member
    };
    let membership = Membership {
        id: Uuid::now_v7(),
        conversation_id: conversation.id,
        identity_id: creator,
        role,
        joined_at: w.now,
    };
    store::insert_membership(w.conn(), &membership).await?;
    w.record(ChangeKind::Insert, None, Some(membership.into()))
        .await?;
    debug!(conversation = %conversation.id, %creator, ?role, "creator joined");
    Ok(())
}

async fn bootstrap_profile(w: &mut Write<'_>, event: &IdentityCreated) -> Result<Profile> {
    let profile = Profile {
        handle: event.handle.clone(),
        display_name: event.display_name.clone(),
        ..Profile::blank(event.id, w.now)
    };
    store::insert_profile(w.conn(), &profile).await?;
    Ok(profile)
}
