use axum::{Json, extract::State};
use campus_types::api::MeetingResponse;

use crate::state::AppState;

/// Video room configuration for the signed-in user's client.
pub async fn meeting(State(state): State<AppState>) -> Json<MeetingResponse> {
    Json(state.meeting.clone())
}
