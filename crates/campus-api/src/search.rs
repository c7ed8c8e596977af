use axum::{
    Extension, Json,
    extract::{Query, State},
};
use tracing::debug;
use uuid::Uuid;

use campus_db::models::{StudentRow, UserRow};
use campus_types::api::{SearchQuery, StudentSummary, UserSummary};
use campus_types::models::{Role, Session};

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::validation::{Rules, Validator, validate};

impl Rules for SearchQuery {
    const FIELDS: &'static [&'static str] = &["search"];

    fn check(&self, v: &mut Validator<'_>) -> anyhow::Result<()> {
        v.text("search", &self.search).required().min(3);
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt account id {}: {}", raw, e)))
}

fn student_summary(row: StudentRow) -> Result<StudentSummary, ApiError> {
    Ok(StudentSummary {
        id: parse_id(&row.id)?,
        first_name: row.first_name,
        last_name: row.last_name,
        city: row.city,
        country: row.country,
    })
}

fn user_summary(row: UserRow) -> Result<UserSummary, ApiError> {
    Ok(UserSummary {
        id: parse_id(&row.id)?,
        name: row.name,
        first_name: row.first_name,
        last_name: row.last_name,
        city: row.city,
        postal_code: row.postal_code,
        profile_picture: row.profile_picture,
    })
}

// -- Services --

/// Approved students matching the query, never the requester. The query is
/// checked before the store is touched.
pub async fn search_students(
    state: &AppState,
    session: &Session,
    query: SearchQuery,
) -> Result<Vec<StudentSummary>, ApiError> {
    validate(&query, None)?;

    let requester = session.account_id.to_string();
    let rows = blocking(state, move |s| Ok(s.db.search_students(&query.search, &requester)?)).await?;
    debug!("Student search by {} matched {}", session.account_id, rows.len());
    rows.into_iter().map(student_summary).collect()
}

/// Approved student-role users matching the query on profile fields, course
/// names or category names, never the requester.
pub async fn search_users(
    state: &AppState,
    session: &Session,
    query: SearchQuery,
) -> Result<Vec<UserSummary>, ApiError> {
    validate(&query, None)?;

    let requester = session.account_id.to_string();
    let rows = blocking(state, move |s| {
        Ok(s.db.search_users(&query.search, &requester, Role::Student.id())?)
    })
    .await?;
    debug!("User search by {} matched {}", session.account_id, rows.len());
    rows.into_iter().map(user_summary).collect()
}

// -- Handlers --

pub async fn student_search(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<StudentSummary>>, ApiError> {
    let old = serde_json::to_value(&query).ok();
    let results = search_students(&state, &session, query).await.map_err(|e| e.with_old(old))?;
    Ok(Json(results))
}

pub async fn user_search(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let old = serde_json::to_value(&query).ok();
    let results = search_users(&state, &session, query).await.map_err(|e| e.with_old(old))?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_queries_fail_without_a_store() {
        // No store is passed: a rule reaching for one would surface as Internal
        match validate(&SearchQuery { search: "ab".into() }, None) {
            Err(ApiError::Validation { errors, .. }) => {
                assert_eq!(errors["search"], "The search must be at least 3 characters.");
            }
            other => panic!("unexpected {other:?}"),
        }
        match validate(&SearchQuery::default(), None) {
            Err(ApiError::Validation { errors, .. }) => {
                assert_eq!(errors["search"], "The search field is required.");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(validate(&SearchQuery { search: "abc".into() }, None).is_ok());
    }
}
