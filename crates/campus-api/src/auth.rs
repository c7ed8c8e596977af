use axum::{Extension, Json, extract::State, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use campus_types::api::{FormResponse, LoginResponse, MessageResponse, StudentLoginRequest, UserLoginRequest};
use campus_types::models::{Claims, Role, Scope, Session};

use crate::error::ApiError;
use crate::middleware::SESSION_COOKIE;
use crate::state::{AppState, AppStateInner, blocking};
use crate::storage::random_alphanumeric;
use crate::validation::{Rules, Validator, is_email, validate};

impl Rules for StudentLoginRequest {
    const FIELDS: &'static [&'static str] = &["email", "password"];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("email", &self.email).required().email();
        v.text("password", &self.password).required();
        Ok(())
    }
}

impl Rules for UserLoginRequest {
    const FIELDS: &'static [&'static str] = &["identifier", "password"];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("identifier", &self.identifier).required();
        v.text("password", &self.password).required();
        Ok(())
    }
}

/// A freshly created session and the signed token pointing at it.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: Session,
    pub token: String,
}

// -- Services --

/// Check student credentials and open a student-scope session.
pub async fn login_student(state: &AppState, req: StudentLoginRequest) -> Result<IssuedSession, ApiError> {
    validate(&req, None)?;

    blocking(state, move |s| {
        let candidate = s.db.get_student_by_email(&req.email)?;
        let account_id = match candidate {
            Some(row) => {
                let password_ok = s.passwords.verify(&req.password, &row.password);
                if !(password_ok && row.approved) {
                    return Err(ApiError::InvalidCredentials);
                }
                row.id
            }
            None => {
                s.passwords.verify_dummy(&req.password);
                return Err(ApiError::InvalidCredentials);
            }
        };
        let account_id: Uuid = account_id.parse().map_err(|e| anyhow::anyhow!("corrupt student id: {}", e))?;
        issue_session(s, Scope::Student, account_id)
    })
    .await
}

/// Check user credentials and open a user-scope session. The identifier is
/// looked up as an email when it is email-shaped, otherwise as a display name.
pub async fn login_user(state: &AppState, req: UserLoginRequest) -> Result<IssuedSession, ApiError> {
    validate(&req, None)?;

    blocking(state, move |s| {
        let candidate = if is_email(&req.identifier) {
            s.db.get_user_by_email(&req.identifier)?
        } else {
            s.db.get_user_by_name(&req.identifier)?
        };
        let account_id = match candidate {
            Some(row) => {
                // Always pay for the hash check so timing does not single out
                // unapproved accounts
                let password_ok = s.passwords.verify(&req.password, &row.password);
                if !(password_ok && row.approved && row.role_id == Role::Student.id()) {
                    return Err(ApiError::InvalidCredentials);
                }
                row.id
            }
            None => {
                s.passwords.verify_dummy(&req.password);
                return Err(ApiError::InvalidCredentials);
            }
        };
        let account_id: Uuid = account_id.parse().map_err(|e| anyhow::anyhow!("corrupt user id: {}", e))?;
        issue_session(s, Scope::User, account_id)
    })
    .await
}

/// Delete the session row. The token and the anti-forgery token bound to it
/// stop working immediately.
pub async fn logout(state: &AppState, session: &Session) -> Result<(), ApiError> {
    let sid = session.id.to_string();
    blocking(state, move |s| {
        s.db.delete_session(&sid)?;
        Ok(())
    })
    .await?;
    info!("{} {} logged out", session.scope.as_str(), session.account_id);
    Ok(())
}

fn issue_session(s: &AppStateInner, scope: Scope, account_id: Uuid) -> Result<IssuedSession, ApiError> {
    let sid = Uuid::new_v4();
    let csrf_token = random_alphanumeric(40);
    let expires = chrono::Utc::now() + s.session_ttl;

    s.db.create_session(
        &sid.to_string(),
        scope.as_str(),
        &account_id.to_string(),
        &csrf_token,
        &campus_db::sqlite_timestamp(expires),
    )?;

    let claims = Claims { sub: account_id, scope, sid, exp: expires.timestamp() as usize };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(s.jwt_secret.as_bytes()))
        .map_err(|e| anyhow::anyhow!("Failed to sign session token: {}", e))?;

    info!("{} {} logged in", scope.as_str(), account_id);
    Ok(IssuedSession { session: Session { id: sid, scope, account_id, csrf_token }, token })
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn login_response(jar: CookieJar, issued: IssuedSession) -> impl IntoResponse {
    let body = LoginResponse {
        account_id: issued.session.account_id,
        scope: issued.session.scope,
        token: issued.token.clone(),
        csrf_token: issued.session.csrf_token,
    };
    (jar.add(session_cookie(issued.token)), Json(body))
}

// -- Handlers --

pub async fn student_login_form() -> Json<FormResponse> {
    Json(FormResponse { fields: StudentLoginRequest::field_names(), courses: None, token: None })
}

pub async fn user_login_form() -> Json<FormResponse> {
    Json(FormResponse { fields: UserLoginRequest::field_names(), courses: None, token: None })
}

pub async fn student_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<StudentLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let old = serde_json::to_value(&req).ok();
    let issued = login_student(&state, req).await.map_err(|e| e.with_old(old))?;
    Ok(login_response(jar, issued))
}

pub async fn user_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<UserLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let old = serde_json::to_value(&req).ok();
    let issued = login_user(&state, req).await.map_err(|e| e.with_old(old))?;
    Ok(login_response(jar, issued))
}

/// POST /logout and /student/logout; the scope guard already picked the scope.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    logout(&state, &session).await?;
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    Ok((jar, Json(MessageResponse { message: "Logged out successfully!".into() })))
}
