// src/routes/user_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    auth::{generate_password, hash_password, normalize_email},
    error::{is_unique_violation, ApiError},
    middleware::{auth_context::AuthContext, client_meta::ClientMeta},
    models::{is_valid_blood_group, ApiOk, AppState, Role},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users", post(create_user))
        .route("/users/{user_id}", get(get_user))
        .route("/profile", get(get_profile))
        .route("/profile", put(update_profile))
}

/* ============================================================
   DTOs
   ============================================================ */

/// Full user payload, password material excluded.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserDto {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub phone: Option<String>,
    pub height: Option<f32>,
    pub weight: Option<f32>,
    pub blood_group: Option<String>,
    pub past_medical_history: Option<String>,
    pub current_medications: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const USER_SELECT: &str = r#"
    SELECT user_id, email, name, role, student_id, phone,
           height, weight, blood_group, past_medical_history, current_medications,
           created_at, updated_at
    FROM app_user
"#;

fn validate_height(h: f32) -> Result<(), ApiError> {
    if h.is_finite() && h > 0.0 && h <= 300.0 {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid height value"))
    }
}

fn validate_weight(w: f32) -> Result<(), ApiError> {
    if w.is_finite() && w > 0.0 && w <= 500.0 {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid weight value"))
    }
}

/* ============================================================
   GET /users  (admin)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Query(q): Query<ListUsersQuery>,
) -> Result<Json<ApiOk<Vec<UserDto>>>, ApiError> {
    auth.require_admin()?;

    let sql = format!(
        r#"{USER_SELECT}
        WHERE ($1::smallint IS NULL OR role = $1)
        ORDER BY created_at DESC
        "#
    );

    let users = sqlx::query_as::<_, UserDto>(&sql)
        .bind(q.role)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    audit::record(
        &state.db,
        auth.user_id,
        "VIEW_USERS",
        json!({ "role": q.role }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk { data: users }))
}

/* ============================================================
   POST /users  (admin)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub phone: Option<String>,
    pub height: Option<f32>,
    pub weight: Option<f32>,
    pub blood_group: Option<String>,
    pub past_medical_history: Option<String>,
    pub current_medications: Option<String>,
}

/// Create an account with a server-generated password, mailed to the new
/// user. The plaintext never appears in the response or the audit trail.
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiOk<UserDto>>), ApiError> {
    auth.require_admin()?;

    let email = normalize_email(&req.email);
    let name = req.name.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let student_id = match req.role {
        Role::Student => Some(
            req.student_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ApiError::validation("student_id is required for students"))?
                .to_string(),
        ),
        _ => None,
    };

    if let Some(bg) = req.blood_group.as_deref() {
        if !is_valid_blood_group(bg) {
            return Err(ApiError::validation("Invalid blood group"));
        }
    }
    if let Some(h) = req.height {
        validate_height(h)?;
    }
    if let Some(w) = req.weight {
        validate_weight(w)?;
    }

    let password = generate_password();
    let password_hash = hash_password(&password).map_err(ApiError::Internal)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO app_user
            (email, name, password_hash, role, student_id, phone,
             height, weight, blood_group, past_medical_history, current_medications)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING user_id
        "#,
    )
        .bind(&email)
        .bind(name)
        .bind(&password_hash)
        .bind(req.role)
        .bind(student_id.as_deref())
        .bind(req.phone.as_deref())
        .bind(req.height)
        .bind(req.weight)
        .bind(req.blood_group.as_deref())
        .bind(req.past_medical_history.as_deref())
        .bind(req.current_medications.as_deref())
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict(
                    "DUPLICATE_USER",
                    "A user with this email or student id already exists".into(),
                )
            } else {
                ApiError::db(e)
            }
        })?;

    // Fire-and-forget credential delivery.
    state.mailer.send_credentials(&email, name, &password).await;

    audit::record(
        &state.db,
        auth.user_id,
        "CREATE_USER",
        json!({
            "user_id": user_id,
            "role": req.role,
            "email": email,
            "student_id": student_id,
        }),
        &meta,
    )
    .await;

    let sql = format!("{USER_SELECT} WHERE user_id = $1");
    let user = sqlx::query_as::<_, UserDto>(&sql)
        .bind(user_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: user })))
}

/* ============================================================
   GET /users/{id}  (admin or doctor)
   ============================================================ */

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<UserDto>>, ApiError> {
    if !auth.is_admin() && !auth.is_doctor() {
        return Err(ApiError::forbidden("Admin or doctor access required"));
    }

    let sql = format!("{USER_SELECT} WHERE user_id = $1");
    let user = sqlx::query_as::<_, UserDto>(&sql)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "User not found".into()))?;

    audit::record(
        &state.db,
        auth.user_id,
        "VIEW_USER_PROFILE",
        json!({ "viewed_user_id": user.user_id, "viewed_user_role": user.role }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk { data: user }))
}

/* ============================================================
   GET /profile, PUT /profile  (student self-service)
   ============================================================ */

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<UserDto>>, ApiError> {
    auth.require_student()?;

    let sql = format!("{USER_SELECT} WHERE user_id = $1");
    let user = sqlx::query_as::<_, UserDto>(&sql)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: user }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub height: Option<f32>,
    pub weight: Option<f32>,
    pub blood_group: Option<String>,
    pub past_medical_history: Option<String>,
    pub current_medications: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiOk<UserDto>>, ApiError> {
    auth.require_student()?;

    if let Some(name) = req.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name must not be empty"));
        }
    }
    if let Some(h) = req.height {
        validate_height(h)?;
    }
    if let Some(w) = req.weight {
        validate_weight(w)?;
    }
    if let Some(bg) = req.blood_group.as_deref() {
        if !is_valid_blood_group(bg) {
            return Err(ApiError::validation("Invalid blood group"));
        }
    }

    let _: Uuid = sqlx::query_scalar(
        r#"
        UPDATE app_user
        SET
          name                 = COALESCE($2, name),
          phone                = COALESCE($3, phone),
          height               = COALESCE($4, height),
          weight               = COALESCE($5, weight),
          blood_group          = COALESCE($6, blood_group),
          past_medical_history = COALESCE($7, past_medical_history),
          current_medications  = COALESCE($8, current_medications),
          updated_at = now()
        WHERE user_id = $1
        RETURNING user_id
        "#,
    )
        .bind(auth.user_id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.phone.as_deref())
        .bind(req.height)
        .bind(req.weight)
        .bind(req.blood_group.as_deref())
        .bind(req.past_medical_history.as_deref())
        .bind(req.current_medications.as_deref())
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    let sql = format!("{USER_SELECT} WHERE user_id = $1");
    let user = sqlx::query_as::<_, UserDto>(&sql)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: user }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_bounds() {
        assert!(validate_height(175.5).is_ok());
        assert!(validate_height(300.0).is_ok());
        assert!(validate_height(0.0).is_err());
        assert!(validate_height(-1.0).is_err());
        assert!(validate_height(301.0).is_err());
        assert!(validate_height(f32::NAN).is_err());
    }

    #[test]
    fn weight_bounds() {
        assert!(validate_weight(68.2).is_ok());
        assert!(validate_weight(500.0).is_ok());
        assert!(validate_weight(0.0).is_err());
        assert!(validate_weight(501.0).is_err());
    }
}
