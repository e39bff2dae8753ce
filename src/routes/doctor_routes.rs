// src/routes/doctor_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    error::{is_unique_violation, ApiError},
    middleware::{auth_context::AuthContext, client_meta::ClientMeta},
    models::{today, ApiOk, AppState, OkData, OkResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        .route("/doctors/stats", get(doctor_stats))
        .route("/doctors/{doctor_id}/checkin", patch(set_checkin))
        .route("/doctors/{doctor_id}/leaves", get(list_leaves))
        .route("/doctors/{doctor_id}/leaves", post(add_leave))
        .route("/doctors/{doctor_id}/leaves/{date}", delete(remove_leave))
}

async fn ensure_doctor_exists(state: &AppState, doctor_id: Uuid) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar(
        r#"SELECT EXISTS (SELECT 1 FROM app_user WHERE user_id = $1 AND role = 2)"#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    if exists {
        Ok(())
    } else {
        Err(ApiError::NotFound("NOT_FOUND", "Doctor not found".into()))
    }
}

/* ============================================================
   GET /doctors  (directory, any authenticated user)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorBrief {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

pub async fn list_doctors(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<DoctorBrief>>>, ApiError> {
    let doctors = sqlx::query_as::<_, DoctorBrief>(
        r#"
        SELECT user_id, name, email
        FROM app_user
        WHERE role = 2
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: doctors }))
}

/* ============================================================
   GET /doctors/stats  (admin staffing view)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorStats {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_checked_in: bool,
    pub total_appointments: i64,
    pub today_appointments: i64,
    pub pending_appointments: i64,
}

pub async fn doctor_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
) -> Result<Json<ApiOk<Vec<DoctorStats>>>, ApiError> {
    auth.require_admin()?;

    let stats = sqlx::query_as::<_, DoctorStats>(
        r#"
        SELECT
          u.user_id,
          u.name,
          u.email,
          u.phone,
          u.is_checked_in,
          count(a.appointment_id)                                           AS total_appointments,
          count(a.appointment_id) FILTER (WHERE a.date = $1)                AS today_appointments,
          count(a.appointment_id) FILTER (WHERE a.status IN (0, 1))         AS pending_appointments
        FROM app_user u
        LEFT JOIN appointment a ON a.doctor_id = u.user_id
        WHERE u.role = 2
        GROUP BY u.user_id
        ORDER BY u.name ASC
        "#,
    )
    .bind(today())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    audit::record(&state.db, auth.user_id, "VIEW_DOCTORS", json!({}), &meta).await;

    Ok(Json(ApiOk { data: stats }))
}

/* ============================================================
   PATCH /doctors/{id}/checkin  (admin)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub is_checked_in: bool,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CheckinResponse {
    pub user_id: Uuid,
    pub name: String,
    pub is_checked_in: bool,
}

pub async fn set_checkin(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<ApiOk<CheckinResponse>>, ApiError> {
    auth.require_admin()?;

    let updated = sqlx::query_as::<_, CheckinResponse>(
        r#"
        UPDATE app_user
        SET is_checked_in = $2, updated_at = now()
        WHERE user_id = $1
          AND role = 2
        RETURNING user_id, name, is_checked_in
        "#,
    )
    .bind(doctor_id)
    .bind(req.is_checked_in)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Doctor not found".into()))?;

    audit::record(
        &state.db,
        auth.user_id,
        "UPDATE_DOCTOR_CHECKIN",
        json!({
            "doctor_id": doctor_id,
            "doctor_name": updated.name,
            "is_checked_in": updated.is_checked_in,
        }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk { data: updated }))
}

/* ============================================================
   Leave calendar
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LeaveDto {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

pub async fn list_leaves(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<LeaveDto>>>, ApiError> {
    if !auth.is_admin() && !(auth.is_doctor() && auth.user_id == doctor_id) {
        return Err(ApiError::forbidden("Only admin or the doctor can view leaves"));
    }
    ensure_doctor_exists(&state, doctor_id).await?;

    let leaves = sqlx::query_as::<_, LeaveDto>(
        r#"
        SELECT doctor_id, date
        FROM doctor_leave
        WHERE doctor_id = $1
        ORDER BY date ASC
        "#,
    )
    .bind(doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: leaves }))
}

#[derive(Debug, Deserialize)]
pub struct AddLeaveRequest {
    pub date: NaiveDate,
}

pub async fn add_leave(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<AddLeaveRequest>,
) -> Result<(StatusCode, Json<ApiOk<LeaveDto>>), ApiError> {
    auth.require_admin()?;
    ensure_doctor_exists(&state, doctor_id).await?;

    let leave = sqlx::query_as::<_, LeaveDto>(
        r#"
        INSERT INTO doctor_leave (doctor_id, date)
        VALUES ($1, $2)
        RETURNING doctor_id, date
        "#,
    )
    .bind(doctor_id)
    .bind(req.date)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("DUPLICATE_LEAVE", "Leave already recorded for this date".into())
        } else {
            ApiError::db(e)
        }
    })?;

    audit::record(
        &state.db,
        auth.user_id,
        "ADD_DOCTOR_LEAVE",
        json!({ "doctor_id": doctor_id, "date": req.date }),
        &meta,
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiOk { data: leave })))
}

pub async fn remove_leave(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<OkResponse>, ApiError> {
    auth.require_admin()?;

    let res = sqlx::query(
        r#"DELETE FROM doctor_leave WHERE doctor_id = $1 AND date = $2"#,
    )
    .bind(doctor_id)
    .bind(date)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "No leave recorded for this date".into()));
    }

    audit::record(
        &state.db,
        auth.user_id,
        "REMOVE_DOCTOR_LEAVE",
        json!({ "doctor_id": doctor_id, "date": date }),
        &meta,
    )
    .await;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
