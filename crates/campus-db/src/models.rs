/// Database row types. These map directly to SQLite rows and are kept
/// distinct from campus-types API models so the DB layer stays independent.

pub struct StudentRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub streetnr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub password: String,
    pub approved: bool,
    pub created_at: String,
}

pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street_nr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub password: String,
    pub role_id: i64,
    pub profile_picture: Option<String>,
    pub approved: bool,
    pub created_at: String,
}

pub struct NewStudent {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub streetnr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub password_hash: String,
}

pub struct NewUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street_nr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub password_hash: String,
    pub role_id: i64,
    pub profile_picture: Option<String>,
}

/// Editable profile columns of a user.
pub struct UserUpdate {
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street_nr: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    /// New picture reference; `None` keeps the current one.
    pub profile_picture: Option<String>,
}

/// A committed profile update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdated {
    /// Picture reference replaced by this update, if any.
    pub replaced_picture: Option<String>,
}

pub struct NewEnrollment {
    pub course_id: i64,
    pub start_year: i32,
    pub end_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: i64,
    pub name: String,
    pub categories: Vec<CategoryRow>,
}

#[derive(Debug, Clone)]
pub struct EnrollmentRow {
    pub course_id: i64,
    pub course_name: String,
    pub start_year: i32,
    pub end_year: i32,
}

pub struct SessionRow {
    pub id: String,
    pub scope: String,
    pub account_id: String,
    pub csrf_token: String,
    pub expires_at: String,
}

/// Result of redeeming a reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset { user_id: String, sessions_revoked: usize },
    /// Unknown, already used, or expired.
    InvalidToken,
    /// The token is live but its email no longer belongs to a user.
    AccountMissing,
}
