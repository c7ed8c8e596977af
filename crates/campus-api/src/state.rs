use std::sync::Arc;

use campus_db::Database;
use campus_types::api::MeetingResponse;
use tracing::error;

use crate::error::ApiError;
use crate::password::Passwords;
use crate::password_reset::ResetNotifier;
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub storage: Storage,
    pub passwords: Passwords,
    pub notifier: Box<dyn ResetNotifier>,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
    /// `None` keeps reset tokens valid until used.
    pub reset_token_ttl: Option<chrono::Duration>,
    pub meeting: MeetingResponse,
}

/// Run blocking work (SQLite, Argon2) off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}
