use std::time::Duration;

use campus_api::AppState;
use tracing::{info, warn};

/// Background task that prunes expired sessions and reset tokens.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let state = state.clone();
        let result = tokio::task::spawn_blocking(move || purge_expired(&state)).await;
        match result {
            Ok(Ok((sessions, resets))) => {
                if sessions + resets > 0 {
                    info!("Cleanup: pruned {} sessions and {} reset tokens", sessions, resets);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {:#}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}

fn purge_expired(state: &AppState) -> anyhow::Result<(usize, usize)> {
    let sessions = state.db.purge_expired_sessions()?;
    let resets = match state.reset_token_ttl {
        Some(ttl) => state.db.purge_expired_password_resets(ttl.num_minutes())?,
        None => 0,
    };
    Ok((sessions, resets))
}
