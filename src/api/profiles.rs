use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppResult, Store, model::Profile};

use super::Caller;

#[derive(Deserialize)]
pub(crate) struct ProfileBody {
    handle: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    Caller(caller): Caller,
    State(store): State<Store>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(store.list_profiles(caller).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(profile) = store.get_profile(caller, id).await? else {
        return Ok(super::sorry());
    };
    Ok(Json(profile).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn insert(
    Caller(caller): Caller,
    State(store): State<Store>,
    Json(profile): Json<Profile>,
) -> AppResult<Response> {
    let profile = store.insert_profile(caller, profile).await?;
    Ok((StatusCode::CREATED, Json(profile)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProfileBody>,
) -> AppResult<Json<Profile>> {
    let current = super::target(store.get_profile(caller, id).await?)?;
    let ProfileBody { handle, display_name, avatar_url, bio } = body;
    let profile = Profile {
        handle,
        display_name,
        avatar_url,
        bio,
        ..current
    };
    Ok(Json(store.update_profile(caller, profile).await?))
}
