pub mod auth;
pub mod error;
pub mod meeting;
pub mod middleware;
pub mod password;
pub mod password_reset;
pub mod profile;
pub mod registration;
pub mod routes;
pub mod search;
pub mod state;
pub mod storage;
pub mod validation;

pub use routes::router;
pub use state::{AppState, AppStateInner};
