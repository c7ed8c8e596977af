use axum::{
    Json,
    extract::{Path, State},
};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use campus_db::models::ResetOutcome;
use campus_types::api::{FormResponse, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest};

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::validation::{Rules, Validator, validate};

pub const RESET_LINK_SENT: &str = "If that email address is registered, a reset link has been sent.";
pub const PASSWORD_RESET: &str = "Your password has been reset!";

/// Delivers the raw reset token to the account owner.
pub trait ResetNotifier: Send + Sync {
    fn send_reset_link(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

/// Writes the reset link to the log. Stands in for a mailer.
pub struct LogNotifier {
    pub app_url: String,
}

impl ResetNotifier for LogNotifier {
    fn send_reset_link(&self, email: &str, token: &str) -> anyhow::Result<()> {
        info!(
            "Password reset link for {}: {}/reset-password/{}",
            email,
            self.app_url.trim_end_matches('/'),
            token
        );
        Ok(())
    }
}

impl Rules for ForgotPasswordRequest {
    const FIELDS: &'static [&'static str] = &["email"];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("email", &self.email).required().email();
        Ok(())
    }
}

impl Rules for ResetPasswordRequest {
    const FIELDS: &'static [&'static str] = &["token", "password", "password_confirmation"];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("token", &self.token).required();
        v.text("password", &self.password).required().min(6).confirmed(&self.password_confirmation);
        Ok(())
    }
}

pub fn token_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// -- Services --

/// Issue a reset token when the email belongs to a user. The outcome is not
/// observable by the caller.
pub async fn forgot_password(state: &AppState, req: ForgotPasswordRequest) -> Result<(), ApiError> {
    validate(&req, None)?;

    blocking(state, move |s| {
        if s.db.get_user_by_email(&req.email)?.is_none() {
            info!("Password reset requested for unknown email");
            return Ok(());
        }

        let token = generate_token();
        s.db.replace_password_reset(&req.email, &token_digest(&token))?;

        if let Err(e) = s.notifier.send_reset_link(&req.email, &token) {
            warn!("Failed to deliver reset link to {}: {:#}", req.email, e);
        }
        Ok(())
    })
    .await
}

/// Consume a reset token: set the new password, drop every token for the
/// account and end its sessions. A token redeems at most once.
pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> Result<(), ApiError> {
    validate(&req, None)?;

    blocking(state, move |s| {
        let max_age = s.reset_token_ttl.map(|ttl| ttl.num_minutes());
        let hash = s.passwords.hash(&req.password)?;

        match s.db.consume_password_reset(&token_digest(&req.token), max_age, &hash)? {
            ResetOutcome::Reset { user_id, sessions_revoked } => {
                info!("Password reset for user {} ({} sessions revoked)", user_id, sessions_revoked);
                Ok(())
            }
            ResetOutcome::InvalidToken => Err(ApiError::InvalidResetToken),
            ResetOutcome::AccountMissing => Err(ApiError::ResetAccountMissing),
        }
    })
    .await
}

// -- Handlers --

pub async fn forgot_password_form() -> Json<FormResponse> {
    Json(FormResponse { fields: ForgotPasswordRequest::field_names(), courses: None, token: None })
}

pub async fn reset_password_form(Path(token): Path<String>) -> Json<FormResponse> {
    Json(FormResponse { fields: ResetPasswordRequest::field_names(), courses: None, token: Some(token) })
}

pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let old = serde_json::to_value(&req).ok();
    forgot_password(&state, req).await.map_err(|e| e.with_old(old))?;
    Ok(Json(MessageResponse { message: RESET_LINK_SENT.into() }))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    reset_password(&state, req).await?;
    Ok(Json(MessageResponse { message: PASSWORD_RESET.into() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_random_hex_and_digests_are_stable() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);

        assert_eq!(token_digest(&a), token_digest(&a));
        assert_ne!(token_digest(&a), a);
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reset_rules() {
        let req = ResetPasswordRequest {
            token: String::new(),
            password: "secret1".into(),
            password_confirmation: "secret2".into(),
        };
        match validate(&req, None) {
            Err(ApiError::Validation { errors, .. }) => {
                assert_eq!(errors["token"], "The token field is required.");
                assert_eq!(errors["password"], "The password confirmation does not match.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
