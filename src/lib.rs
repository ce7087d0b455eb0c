pub mod api;
pub mod appresult;
pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod policy;
mod res;
pub mod store;
pub mod triggers;

use axum::extract::FromRef;

pub use appresult::{AppError, AppResult};
pub use config::Config;
pub use error::{Constraint, Error, Result};
pub use feed::{Change, ChangeKind, Subscription};
pub use policy::Operation;
pub use store::Store;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
}
