mod caller;
mod conversations;
mod feed;
mod identities;
mod messages;
mod profiles;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use crate::{AppResult, AppState, Error};

pub use caller::{CALLER_HEADER, Caller};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/identities", post(identities::created))
        .route("/identities/{id}", axum::routing::delete(identities::removed))
        .route("/profiles", get(profiles::list).post(profiles::insert))
        .route("/profiles/{id}", get(profiles::get).put(profiles::update))
        .route(
            "/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get).put(conversations::update),
        )
        .route(
            "/conversations/{id}/members",
            get(conversations::members).post(conversations::join),
        )
        .route(
            "/conversations/{id}/members/{identity}",
            put(conversations::set_role).delete(conversations::remove_member),
        )
        .route(
            "/conversations/{id}/messages",
            get(messages::list).post(messages::send),
        )
        .route(
            "/conversations/{id}/typing",
            get(conversations::typing).put(conversations::set_typing),
        )
        .route(
            "/messages/{id}",
            get(messages::get).put(messages::update).delete(messages::delete),
        )
        .route(
            "/messages/{id}/receipts",
            get(messages::receipts).post(messages::mark_read),
        )
        .route("/receipts", post(messages::mark_read_many))
        .route("/receipts/{id}", put(messages::update_receipt))
        .route("/feed", get(feed::feed))
}

/// Missing and invisible rows answer the same way.
pub(crate) fn sorry() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// The row an edit applies to. One the caller cannot see is refused like one
/// it may not touch.
pub(crate) fn target<T>(row: Option<T>) -> AppResult<T> {
    row.ok_or_else(|| Error::AuthorizationDenied.into())
}
