use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;

use campus_db::models::{UserRow, UserUpdate};
use campus_types::api::{
    CategoryResponse, EditProfileResponse, EnrollmentResponse, PublicProfile, UpdateProfileRequest, UserProfile,
};
use campus_types::models::Session;

use crate::error::ApiError;
use crate::registration::{course_catalogue, discard_picture, store_picture};
use crate::state::{AppState, AppStateInner, blocking};
use crate::validation::{Rules, Validator, validate};

impl Rules for UpdateProfileRequest {
    const FIELDS: &'static [&'static str] = &[
        "first_name",
        "last_name",
        "name",
        "email",
        "phone",
        "street_nr",
        "postal_code",
        "city",
        "country",
        "profile_picture",
    ];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("first_name", &self.first_name).required().max(255);
        v.text("last_name", &self.last_name).required().max(255);
        v.text("name", &self.name).required().max(255);
        v.text("email", &self.email).required().max(255).email();
        v.text("phone", &self.phone).required().max(255);
        v.text("street_nr", &self.street_nr).required().max(255);
        v.text("postal_code", &self.postal_code).required().max(255);
        v.text("city", &self.city).required().max(255);
        v.text("country", &self.country).required().max(255);
        v.image("profile_picture", self.profile_picture.as_ref());
        Ok(())
    }
}

/// A user row plus its enrollments and categories.
struct FullUser {
    row: UserRow,
    courses: Vec<EnrollmentResponse>,
    categories: Vec<CategoryResponse>,
}

fn load_user(s: &AppStateInner, id: &str) -> Result<Option<FullUser>, ApiError> {
    let Some(row) = s.db.get_user_by_id(id)? else {
        return Ok(None);
    };
    let courses = s
        .db
        .get_user_enrollments(id)?
        .into_iter()
        .map(|e| EnrollmentResponse {
            course_id: e.course_id,
            course_name: e.course_name,
            start_year: e.start_year,
            end_year: e.end_year,
        })
        .collect();
    let categories = s
        .db
        .get_user_categories(id)?
        .into_iter()
        .map(|c| CategoryResponse { id: c.id, name: c.name })
        .collect();
    Ok(Some(FullUser { row, courses, categories }))
}

impl FullUser {
    fn id(&self) -> Result<Uuid, ApiError> {
        self.row
            .id
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id {}: {}", self.row.id, e)))
    }

    fn into_own(self) -> Result<UserProfile, ApiError> {
        let id = self.id()?;
        let row = self.row;
        Ok(UserProfile {
            id,
            name: row.name,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            street_nr: row.street_nr,
            postal_code: row.postal_code,
            city: row.city,
            country: row.country,
            profile_picture: row.profile_picture,
            approved: row.approved,
            courses: self.courses,
            categories: self.categories,
        })
    }

    fn into_public(self) -> Result<PublicProfile, ApiError> {
        let id = self.id()?;
        let row = self.row;
        Ok(PublicProfile {
            id,
            name: row.name,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            postal_code: row.postal_code,
            city: row.city,
            country: row.country,
            profile_picture: row.profile_picture,
            courses: self.courses,
            categories: self.categories,
        })
    }
}

// -- Services --

pub async fn own_profile(state: &AppState, session: &Session) -> Result<UserProfile, ApiError> {
    let id = session.account_id.to_string();
    blocking(state, move |s| load_user(s, &id)?.ok_or(ApiError::NotFound)?.into_own()).await
}

/// Another user's public projection. A malformed id is as unknown as a
/// missing one.
pub async fn view_profile(state: &AppState, id: &str) -> Result<PublicProfile, ApiError> {
    let id: Uuid = id.parse().map_err(|_| ApiError::NotFound)?;
    let id = id.to_string();
    blocking(state, move |s| load_user(s, &id)?.ok_or(ApiError::NotFound)?.into_public()).await
}

pub async fn edit_form(state: &AppState, session: &Session) -> Result<EditProfileResponse, ApiError> {
    let id = session.account_id.to_string();
    blocking(state, move |s| {
        let profile = load_user(s, &id)?.ok_or(ApiError::NotFound)?.into_own()?;
        Ok(EditProfileResponse {
            fields: UpdateProfileRequest::field_names(),
            profile,
            courses: course_catalogue(s)?,
        })
    })
    .await
}

/// Apply the editable fields and, when given, a new picture. The old picture
/// file is removed only once the new reference is committed.
pub async fn update_profile(
    state: &AppState,
    session: &Session,
    mut req: UpdateProfileRequest,
) -> Result<UserProfile, ApiError> {
    validate(&req, None)?;

    let picture = match req.profile_picture.take() {
        Some(upload) => Some(store_picture(state, &upload).await?),
        None => None,
    };

    let id = session.account_id.to_string();
    let update = UserUpdate {
        first_name: req.first_name,
        last_name: req.last_name,
        name: req.name,
        email: req.email,
        phone: req.phone,
        street_nr: req.street_nr,
        postal_code: req.postal_code,
        city: req.city,
        country: req.country,
        profile_picture: picture.clone(),
    };
    let applied = blocking(state, move |s| {
        s.db.update_user_profile(&id, &update).map_err(ApiError::from_store)?.ok_or(ApiError::NotFound)
    })
    .await;

    let updated = match applied {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(path) = &picture {
                discard_picture(state, path).await;
            }
            return Err(e);
        }
    };

    if let Some(old) = updated.replaced_picture.filter(|old| Some(old) != picture.as_ref()) {
        discard_picture(state, &old).await;
    }

    info!("User {} updated their profile", session.account_id);
    own_profile(state, session).await
}

// -- Handlers --

pub async fn show_own(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(own_profile(&state, &session).await?))
}

pub async fn show_other(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    Ok(Json(view_profile(&state, &id).await?))
}

pub async fn show_edit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<EditProfileResponse>, ApiError> {
    Ok(Json(edit_form(&state, &session).await?))
}

pub async fn submit_edit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let old = serde_json::to_value(&req).ok();
    let profile = update_profile(&state, &session, req).await.map_err(|e| e.with_old(old))?;
    Ok(Json(profile))
}
