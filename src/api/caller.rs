use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use uuid::Uuid;

use crate::model::IdentityId;

/// Set by the authenticating proxy in front of the service.
pub const CALLER_HEADER: &str = "x-caller-id";

/// The verified identity issuing the request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub IdentityId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(Caller)
            .ok_or((StatusCode::UNAUTHORIZED, "missing caller identity"))
    }
}
