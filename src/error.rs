use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// A unique key already holds a row.
    Duplicate,
    /// A referenced row does not exist.
    MissingReference,
    /// The row itself is malformed (enum out of range, name rules, role rules).
    Invalid(&'static str),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constraint::Duplicate => write!(f, "duplicate key"),
            Constraint::MissingReference => write!(f, "missing reference"),
            Constraint::Invalid(why) => write!(f, "invalid row: {why}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Never carries a reason: it must not tell the caller more than reading would.
    #[error("permission denied")]
    AuthorizationDenied,

    #[error("constraint violation: {0}")]
    ConstraintViolation(Constraint),

    #[error("write failed: {0}")]
    InvariantFailure(String),

    #[error(transparent)]
    Storage(sqlx::Error),

    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(why: &'static str) -> Self {
        Error::ConstraintViolation(Constraint::Invalid(why))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Error::AuthorizationDenied)
    }

    pub fn constraint(&self) -> Option<Constraint> {
        match self {
            Error::ConstraintViolation(c) => Some(*c),
            _ => None,
        }
    }

    /// Wraps anything a hook raised so the caller only sees a generic write failure.
    pub(crate) fn into_invariant(self) -> Self {
        match self {
            Error::InvariantFailure(_) => self,
            other => Error::InvariantFailure(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Database(db) => db.kind(),
            _ => return Error::Storage(err),
        };
        match kind {
            ErrorKind::UniqueViolation => Error::ConstraintViolation(Constraint::Duplicate),
            ErrorKind::ForeignKeyViolation => {
                Error::ConstraintViolation(Constraint::MissingReference)
            }
            ErrorKind::NotNullViolation => Error::invalid("required column missing"),
            ErrorKind::CheckViolation => Error::invalid("value out of range"),
            _ => Error::Storage(err),
        }
    }
}
