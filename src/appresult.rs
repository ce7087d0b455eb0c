use axum::{http::StatusCode, response::{IntoResponse, Response}};
use tracing::error;

use crate::error::Error;

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.0.downcast_ref::<Error>() {
            Some(Error::AuthorizationDenied) => {
                (StatusCode::FORBIDDEN, "permission denied").into_response()
            }
            Some(Error::ConstraintViolation(constraint)) => {
                (StatusCode::CONFLICT, constraint.to_string()).into_response()
            }
            Some(Error::InvariantFailure(why)) => {
                error!(%why, "invariant failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "write failed").into_response()
            }
            _ => {
                error!("{:?}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
