use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Scope;

// Request bodies default every field so that a missing field reaches the
// validator and gets a per-field message instead of a body rejection.
// Secrets are never serialized: the serialized request is what gets echoed
// back as `old` input on validation failures.

// -- Uploads --

/// Image payload embedded in a JSON form: original file name plus base64 bytes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageUpload {
    pub filename: String,
    pub content: String,
}

// -- Registration --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudentRegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub streetnr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserRegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street_nr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub password_confirmation: String,
    /// Selected course ids; `start_years[i]`/`end_years[i]` belong to `courses[i]`.
    pub courses: Vec<i64>,
    pub start_years: Vec<Option<i32>>,
    pub end_years: Vec<Option<i32>>,
    #[serde(skip_serializing)]
    pub profile_picture: Option<ImageUpload>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub account_id: Uuid,
    pub message: String,
}

/// Field names a form accepts, plus the course catalogue where the form needs it.
#[derive(Debug, Serialize)]
pub struct FormResponse {
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<CourseResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// -- Auth --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudentLoginRequest {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// `identifier` is either an email address or a display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserLoginRequest {
    pub identifier: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub account_id: Uuid,
    pub scope: Scope,
    pub token: String,
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Password reset --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetPasswordRequest {
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub password_confirmation: String,
}

// -- Search --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub search: String,
}

#[derive(Debug, Serialize)]
pub struct StudentSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub postal_code: String,
    pub profile_picture: Option<String>,
}

// -- Catalogue --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseResponse {
    pub id: i64,
    pub name: String,
    pub categories: Vec<CategoryResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub course_id: i64,
    pub course_name: String,
    pub start_year: i32,
    pub end_year: i32,
}

// -- Profiles --

/// The authenticated user's own record.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub street_nr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub profile_picture: Option<String>,
    pub approved: bool,
    pub courses: Vec<EnrollmentResponse>,
    pub categories: Vec<CategoryResponse>,
}

/// What one user sees of another.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub profile_picture: Option<String>,
    pub courses: Vec<EnrollmentResponse>,
    pub categories: Vec<CategoryResponse>,
}

#[derive(Debug, Serialize)]
pub struct EditProfileResponse {
    pub fields: Vec<String>,
    pub profile: UserProfile,
    pub courses: Vec<CourseResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street_nr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    #[serde(skip_serializing)]
    pub profile_picture: Option<ImageUpload>,
}

// -- Meeting --

/// Opaque values handed to the hosted video SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingResponse {
    pub domain: String,
    pub room_name: String,
}
