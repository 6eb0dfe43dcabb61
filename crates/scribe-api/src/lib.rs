pub mod auth;
pub mod error;
pub mod follows;
pub mod mail;
pub mod middleware;
pub mod password;
pub mod posts;
pub mod profile;
pub mod routes;
mod views;

pub use auth::{AppState, AppStateInner, Settings};
pub use routes::router;
