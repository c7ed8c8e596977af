use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::{require_student, require_user};
use crate::state::AppState;
use crate::storage::MAX_IMAGE_KIB;
use crate::{auth, meeting, password_reset, profile, registration, search};

/// Largest accepted JSON body: a maximum-size picture in base64 plus the form.
pub const MAX_BODY_BYTES: usize = MAX_IMAGE_KIB * 1024 / 3 * 4 + 64 * 1024;

/// Sent with every stored file so an uploaded SVG cannot run script.
const STORAGE_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

/// Every endpoint of the service. The binary adds CORS and tracing layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/student/register", get(registration::student_register_form).post(registration::student_register))
        .route("/student/login", get(auth::student_login_form).post(auth::student_login))
        .route("/register", get(registration::user_register_form).post(registration::user_register))
        .route("/login", get(auth::user_login_form).post(auth::user_login))
        .route(
            "/forgot-password",
            get(password_reset::forgot_password_form).post(password_reset::forgot_password_handler),
        )
        .route("/reset-password/{token}", get(password_reset::reset_password_form))
        .route("/reset-password", post(password_reset::reset_password_handler));

    let student_routes = Router::new()
        .route("/student/logout", post(auth::logout_handler))
        .route("/student/search", get(search::student_search))
        .layer(middleware::from_fn_with_state(state.clone(), require_student));

    let user_routes = Router::new()
        .route("/logout", post(auth::logout_handler))
        .route("/search", get(search::user_search))
        .route("/profile", get(profile::show_own))
        .route("/profile/edit", get(profile::show_edit).post(profile::submit_edit))
        .route("/profile/{id}", get(profile::show_other))
        .route("/meeting", get(meeting::meeting))
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    let stored_files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(STORAGE_CSP),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .service(ServeDir::new(state.storage.root()));

    Router::new()
        .merge(public_routes)
        .merge(student_routes)
        .merge(user_routes)
        .nest_service("/storage", stored_files)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
