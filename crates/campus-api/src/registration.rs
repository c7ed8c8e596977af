use axum::{Json, extract::State, http::StatusCode};
use tracing::{info, warn};
use uuid::Uuid;

use campus_db::models::{CourseRow, NewEnrollment, NewStudent, NewUser};
use campus_types::api::{
    CategoryResponse, CourseResponse, FormResponse, ImageUpload, RegisterResponse, StudentRegisterRequest,
    UserRegisterRequest,
};
use campus_types::models::Role;

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, blocking};
use crate::storage::Image;
use crate::validation::{Rules, Unique, Validator, current_year, validate};

pub const REGISTERED: &str = "Registration successful, please wait for approval!";

impl Rules for StudentRegisterRequest {
    const FIELDS: &'static [&'static str] = &[
        "first_name",
        "last_name",
        "email",
        "phone",
        "streetnr",
        "postal_code",
        "city",
        "country",
        "password",
        "password_confirmation",
    ];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("first_name", &self.first_name).required().max(255);
        v.text("last_name", &self.last_name).required().max(255);
        v.text("email", &self.email).required().email().max(255).unique(Unique::StudentEmail)?;
        v.text("phone", &self.phone).required();
        v.text("streetnr", &self.streetnr).required();
        v.text("postal_code", &self.postal_code).required();
        v.text("city", &self.city).required();
        v.text("country", &self.country).required();
        v.text("password", &self.password).required().min(6).confirmed(&self.password_confirmation);
        Ok(())
    }
}

impl Rules for UserRegisterRequest {
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
        "password",
        "password_confirmation",
        "courses",
        "start_years",
        "end_years",
        "profile_picture",
    ];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("first_name", &self.first_name).required().max(255);
        v.text("last_name", &self.last_name).required().max(255);
        v.text("name", &self.name).required().max(255).unique(Unique::UserName)?;
        v.text("email", &self.email).required().email().max(255).unique(Unique::UserEmail)?;
        v.text("phone", &self.phone).required();
        v.text("street_nr", &self.street_nr).required();
        v.text("postal_code", &self.postal_code).required();
        v.text("city", &self.city).required();
        v.text("country", &self.country).required();
        v.text("password", &self.password).required().min(6).confirmed(&self.password_confirmation);

        if v.non_empty_list("courses", self.courses.len()) {
            v.existing_courses("courses", &self.courses)?;
        }

        let year = current_year();
        if v.non_empty_list("start_years", self.start_years.len()) {
            v.same_length("start_years", self.start_years.len(), "courses", self.courses.len());
        }
        for (i, start) in self.start_years.iter().enumerate() {
            v.year(format!("start_years.{i}"), *start).required().between(1900, year + 2);
        }

        if v.non_empty_list("end_years", self.end_years.len()) {
            v.same_length("end_years", self.end_years.len(), "courses", self.courses.len());
        }
        for (i, end) in self.end_years.iter().enumerate() {
            let start = self.start_years.get(i).copied().flatten();
            v.year(format!("end_years.{i}"), *end)
                .required()
                .between(1900, year + 4)
                .at_least(start, &format!("start_years.{i}"));
        }

        v.image("profile_picture", self.profile_picture.as_ref());
        Ok(())
    }
}

pub(crate) fn course_response(row: CourseRow) -> CourseResponse {
    CourseResponse {
        id: row.id,
        name: row.name,
        categories: row
            .categories
            .into_iter()
            .map(|c| CategoryResponse { id: c.id, name: c.name })
            .collect(),
    }
}

pub(crate) fn course_catalogue(s: &AppStateInner) -> Result<Vec<CourseResponse>, ApiError> {
    Ok(s.db.list_courses()?.into_iter().map(course_response).collect())
}

/// Decode and write an already validated upload. Returns the relative path.
pub(crate) async fn store_picture(state: &AppState, upload: &ImageUpload) -> Result<String, ApiError> {
    let image = Image::decode(upload).map_err(|e| ApiError::invalid("profile_picture", e.to_string()))?;
    state.storage.store_profile_picture(&image).await.map_err(ApiError::Storage)
}

/// Remove a stored file, logging rather than failing.
pub(crate) async fn discard_picture(state: &AppState, relative: &str) {
    if let Err(e) = state.storage.delete(relative).await {
        warn!("Failed to delete stored file {}: {:#}", relative, e);
    }
}

// -- Services --

/// Create an unapproved student account.
pub async fn register_student(state: &AppState, req: StudentRegisterRequest) -> Result<Uuid, ApiError> {
    let id = Uuid::new_v4();

    blocking(state, move |s| {
        validate(&req, Some(&s.db))?;

        let password_hash = s.passwords.hash(&req.password)?;
        s.db.create_student(&NewStudent {
            id: id.to_string(),
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            phone: req.phone,
            streetnr: req.streetnr,
            postal_code: req.postal_code,
            city: req.city,
            country: req.country,
            password_hash,
        })
        .map_err(ApiError::from_store)
    })
    .await?;

    info!("Student {} registered", id);
    Ok(id)
}

/// Create an unapproved user account with its enrollments and categories.
/// Nothing is left behind on failure: the insert is one transaction and a
/// picture stored for it is deleted again.
pub async fn register_user(state: &AppState, req: UserRegisterRequest) -> Result<Uuid, ApiError> {
    let mut req = blocking(state, move |s| {
        validate(&req, Some(&s.db))?;
        Ok(req)
    })
    .await?;

    let picture = match req.profile_picture.take() {
        Some(upload) => Some(store_picture(state, &upload).await?),
        None => None,
    };

    let id = Uuid::new_v4();
    let enrollments: Vec<NewEnrollment> = req
        .courses
        .iter()
        .zip(req.start_years.iter().zip(req.end_years.iter()))
        .filter_map(|(course_id, (start, end))| {
            Some(NewEnrollment { course_id: *course_id, start_year: (*start)?, end_year: (*end)? })
        })
        .collect();

    let stored = picture.clone();
    let created = blocking(state, move |s| {
        let password_hash = s.passwords.hash(&req.password)?;
        let user = NewUser {
            id: id.to_string(),
            first_name: req.first_name,
            last_name: req.last_name,
            name: req.name,
            email: req.email,
            phone: req.phone,
            street_nr: req.street_nr,
            postal_code: req.postal_code,
            city: req.city,
            country: req.country,
            password_hash,
            role_id: Role::Student.id(),
            profile_picture: stored,
        };
        s.db.create_user(&user, &enrollments).map_err(ApiError::from_store)
    })
    .await;

    if let Err(e) = created {
        if let Some(path) = &picture {
            discard_picture(state, path).await;
        }
        return Err(e);
    }

    info!("User {} registered", id);
    Ok(id)
}

// -- Handlers --

pub async fn student_register_form() -> Json<FormResponse> {
    Json(FormResponse { fields: StudentRegisterRequest::field_names(), courses: None, token: None })
}

pub async fn user_register_form(State(state): State<AppState>) -> Result<Json<FormResponse>, ApiError> {
    let courses = blocking(&state, |s| course_catalogue(s)).await?;
    Ok(Json(FormResponse { fields: UserRegisterRequest::field_names(), courses: Some(courses), token: None }))
}

pub async fn student_register(
    State(state): State<AppState>,
    Json(req): Json<StudentRegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let old = serde_json::to_value(&req).ok();
    let account_id = register_student(&state, req).await.map_err(|e| e.with_old(old))?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { account_id, message: REGISTERED.into() })))
}

pub async fn user_register(
    State(state): State<AppState>,
    Json(req): Json<UserRegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let old = serde_json::to_value(&req).ok();
    let account_id = register_user(&state, req).await.map_err(|e| e.with_old(old))?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { account_id, message: REGISTERED.into() })))
}
