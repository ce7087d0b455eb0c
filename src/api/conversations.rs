use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppResult, Store,
    model::{Conversation, Membership, NewConversation, NewMembership, Role, TypingStatus},
};

use super::Caller;

#[derive(Deserialize)]
pub(crate) struct JoinBody {
    identity_id: Option<Uuid>,
    #[serde(default)]
    role: Role,
}

/// Editable conversation columns. Omitted ones are cleared.
#[derive(Deserialize)]
pub(crate) struct ConversationBody {
    name: Option<String>,
    description: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RoleBody {
    role: Role,
}

#[derive(Deserialize)]
pub(crate) struct TypingBody {
    is_typing: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    Caller(caller): Caller,
    State(store): State<Store>,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(store.list_conversations(caller).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create(
    Caller(caller): Caller,
    State(store): State<Store>,
    Json(new): Json<NewConversation>,
) -> AppResult<Response> {
    let conversation = store.create_conversation(caller, new).await?;
    Ok((StatusCode::CREATED, Json(conversation)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(conversation) = store.get_conversation(caller, id).await? else {
        return Ok(super::sorry());
    };
    Ok(Json(conversation).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConversationBody>,
) -> AppResult<Json<Conversation>> {
    let current = super::target(store.get_conversation(caller, id).await?)?;
    let ConversationBody { name, description, avatar_url } = body;
    let conversation = Conversation {
        name,
        description,
        avatar_url,
        ..current
    };
    Ok(Json(store.update_conversation(caller, conversation).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn members(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Membership>>> {
    Ok(Json(store.list_members(caller, id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(JoinBody { identity_id, role }): Json<JoinBody>,
) -> AppResult<Response> {
    let new = NewMembership {
        conversation_id: id,
        identity_id: identity_id.unwrap_or(caller),
        role,
    };
    let membership = store.join_conversation(caller, new).await?;
    Ok((StatusCode::CREATED, Json(membership)).into_response())
}

/// Memberships are addressed by (conversation, identity) here.
async fn visible_membership(
    store: &Store,
    caller: Uuid,
    id: Uuid,
    identity: Uuid,
) -> AppResult<Membership> {
    super::target(store.get_membership(caller, id, identity).await?)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_role(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path((id, identity)): Path<(Uuid, Uuid)>,
    Json(RoleBody { role }): Json<RoleBody>,
) -> AppResult<Json<Membership>> {
    let membership = visible_membership(&store, caller, id, identity).await?;
    Ok(Json(store.update_membership(caller, membership.id, role).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn remove_member(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path((id, identity)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    let membership = visible_membership(&store, caller, id, identity).await?;
    store.remove_membership(caller, membership.id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn typing(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<TypingStatus>>> {
    Ok(Json(store.list_typing(caller, id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_typing(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(TypingBody { is_typing }): Json<TypingBody>,
) -> AppResult<Json<TypingStatus>> {
    Ok(Json(store.set_typing(caller, id, is_typing).await?))
}
