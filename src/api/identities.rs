use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{AppResult, Store, model::IdentityCreated};

/// Signup webhook from the identity provider.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn created(
    State(store): State<Store>,
    Json(event): Json<IdentityCreated>,
) -> AppResult<Response> {
    let profile = store.identity_created(event).await?;
    Ok((StatusCode::CREATED, Json(profile)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn removed(
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    if !store.identity_removed(id).await? {
        return Ok(super::sorry());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
