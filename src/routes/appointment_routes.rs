// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    error::{is_unique_violation, ApiError},
    middleware::{auth_context::AuthContext, client_meta::ClientMeta},
    models::{
        is_valid_time_slot, status_change_allowed, today, ApiOk, AppState, AppointmentStatus,
        OkData, OkResponse, PersonBrief, Role, TIME_SLOTS,
    },
    routes::prescription_routes::{fetch_prescription_for_appointment, PrescriptionDto},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments))
        .route("/appointments", post(create_appointment))
        .route("/appointments/next", get(next_appointment))
        .route("/appointments/counts", get(appointment_counts))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}", patch(change_status))
        .route("/appointments/{appointment_id}", delete(delete_appointment))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub appointment_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
    pub reason: String,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub student: PersonBrief,
    pub doctor: PersonBrief,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDetailDto {
    #[serde(flatten)]
    pub appointment: AppointmentDto,
    pub prescription: Option<PrescriptionDto>,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentJoinRow {
    appointment_id: Uuid,
    student_id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    time_slot: String,
    reason: String,
    notes: Option<String>,
    status: AppointmentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    s_name: String,
    s_email: String,
    s_student_id: Option<String>,
    d_name: String,
    d_email: String,
}

impl AppointmentJoinRow {
    fn into_dto(self) -> AppointmentDto {
        AppointmentDto {
            appointment_id: self.appointment_id,
            date: self.date,
            time_slot: self.time_slot,
            reason: self.reason,
            notes: self.notes,
            status: self.status,
            student: PersonBrief {
                user_id: self.student_id,
                name: self.s_name,
                email: self.s_email,
                student_id: self.s_student_id,
            },
            doctor: PersonBrief {
                user_id: self.doctor_id,
                name: self.d_name,
                email: self.d_email,
                student_id: None,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const APPOINTMENT_JOIN_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.student_id,
      a.doctor_id,
      a.date,
      a.time_slot,
      a.reason,
      a.notes,
      a.status,
      a.created_at,
      a.updated_at,
      s.name  AS s_name,
      s.email AS s_email,
      s.student_id AS s_student_id,
      d.name  AS d_name,
      d.email AS d_email
    FROM appointment a
    JOIN app_user s ON s.user_id = a.student_id
    JOIN app_user d ON d.user_id = a.doctor_id
"#;

async fn load_appointment(
    state: &AppState,
    appointment_id: Uuid,
) -> Result<AppointmentJoinRow, ApiError> {
    let sql = format!("{APPOINTMENT_JOIN_SELECT} WHERE a.appointment_id = $1");
    sqlx::query_as::<_, AppointmentJoinRow>(&sql)
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Appointment not found".into()))
}

/* ============================================================
   GET /appointments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub upcoming: Option<bool>,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    // Students see their own appointments, doctors their assigned ones,
    // admins everything.
    let (student_filter, doctor_filter) = match auth.role {
        Role::Student => (Some(auth.user_id), None),
        Role::Doctor => (None, Some(auth.user_id)),
        Role::Admin => (None, None),
    };

    let sql = format!(
        r#"{APPOINTMENT_JOIN_SELECT}
        WHERE ($1::uuid IS NULL OR a.student_id = $1)
          AND ($2::uuid IS NULL OR a.doctor_id = $2)
          AND ($3::date IS NULL OR a.date = $3)
          AND ($4::smallint IS NULL OR a.status = $4)
          AND (NOT $5 OR (a.date >= $6 AND a.status IN (0, 1)))
        ORDER BY a.date ASC, array_position($7::text[], a.time_slot) ASC
        "#
    );

    let rows = sqlx::query_as::<_, AppointmentJoinRow>(&sql)
        .bind(student_filter)
        .bind(doctor_filter)
        .bind(q.date)
        .bind(q.status)
        .bind(q.upcoming.unwrap_or(false))
        .bind(today())
        .bind(TIME_SLOTS.to_vec())
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    audit::record(
        &state.db,
        auth.user_id,
        "VIEW_APPOINTMENTS",
        json!({ "date": q.date, "status": q.status }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(AppointmentJoinRow::into_dto).collect(),
    }))
}

/* ============================================================
   POST /appointments (book a slot)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
    pub reason: String,
    pub notes: Option<String>,
    /// Admin bookings name the student; student bookings ignore this.
    pub student_id: Option<Uuid>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentDto>>), ApiError> {
    if auth.is_doctor() {
        return Err(ApiError::forbidden("Doctors cannot book appointments"));
    }

    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::validation("reason is required"));
    }
    if !is_valid_time_slot(&req.time_slot) {
        return Err(ApiError::validation("time_slot is not a bookable slot"));
    }
    if req.date < today() {
        return Err(ApiError::validation("Appointment date must not be in the past"));
    }

    let student_id = if auth.is_student() {
        auth.user_id
    } else {
        let id = req
            .student_id
            .ok_or_else(|| ApiError::validation("student_id is required for admin bookings"))?;
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM app_user WHERE user_id = $1 AND role = 0)"#,
        )
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;
        if !exists {
            return Err(ApiError::NotFound("INVALID_STUDENT", "Student not found".into()));
        }
        id
    };

    let doctor_ok: bool = sqlx::query_scalar(
        r#"SELECT EXISTS (SELECT 1 FROM app_user WHERE user_id = $1 AND role = 2)"#,
    )
    .bind(req.doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;
    if !doctor_ok {
        return Err(ApiError::NotFound("INVALID_DOCTOR", "Doctor not found".into()));
    }

    // Leave check, conflict check and insert run in one transaction. The
    // pre-check gives a clean error message; the partial unique index on
    // (doctor_id, date, time_slot) WHERE status <> 3 decides the winner when
    // two bookings race past the check simultaneously.
    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let on_leave: bool = sqlx::query_scalar(
        r#"SELECT EXISTS (SELECT 1 FROM doctor_leave WHERE doctor_id = $1 AND date = $2)"#,
    )
    .bind(req.doctor_id)
    .bind(req.date)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if on_leave {
        return Err(ApiError::Conflict(
            "DOCTOR_ON_LEAVE",
            "Doctor is not available on this date".into(),
        ));
    }

    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM appointment
            WHERE doctor_id = $1 AND date = $2 AND time_slot = $3 AND status <> 3
        )
        "#,
    )
    .bind(req.doctor_id)
    .bind(req.date)
    .bind(&req.time_slot)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if taken {
        return Err(ApiError::Conflict(
            "SLOT_TAKEN",
            "This time slot is already booked".into(),
        ));
    }

    let appointment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO appointment (student_id, doctor_id, date, time_slot, reason, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, 0)
        RETURNING appointment_id
        "#,
    )
    .bind(student_id)
    .bind(req.doctor_id)
    .bind(req.date)
    .bind(&req.time_slot)
    .bind(reason)
    .bind(req.notes.as_deref())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("SLOT_TAKEN", "This time slot is already booked".into())
        } else {
            ApiError::db(e)
        }
    })?;

    tx.commit().await.map_err(|e| {
        // A racing booking that committed first surfaces here when the index
        // check is deferred to commit.
        if is_unique_violation(&e) {
            ApiError::Conflict("SLOT_TAKEN", "This time slot is already booked".into())
        } else {
            ApiError::db(e)
        }
    })?;

    audit::record(
        &state.db,
        auth.user_id,
        "CREATE_APPOINTMENT",
        json!({
            "appointment_id": appointment_id,
            "doctor_id": req.doctor_id,
            "date": req.date,
            "time_slot": req.time_slot,
        }),
        &meta,
    )
    .await;

    let row = load_appointment(&state, appointment_id).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: row.into_dto() })))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

fn ensure_can_view(auth: &AuthContext, row: &AppointmentJoinRow) -> Result<(), ApiError> {
    let allowed = match auth.role {
        Role::Admin => true,
        Role::Doctor => row.doctor_id == auth.user_id,
        Role::Student => row.student_id == auth.user_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not have access to this appointment"))
    }
}

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDetailDto>>, ApiError> {
    let row = load_appointment(&state, appointment_id).await?;
    ensure_can_view(&auth, &row)?;

    let prescription = fetch_prescription_for_appointment(&state.db, appointment_id).await?;

    Ok(Json(ApiOk {
        data: AppointmentDetailDto {
            appointment: row.into_dto(),
            prescription,
        },
    }))
}

/* ============================================================
   PATCH /appointments/{id}  (status change)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: AppointmentStatus,
}

pub async fn change_status(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let row = load_appointment(&state, appointment_id).await?;

    let action = match req.status {
        AppointmentStatus::Cancelled => {
            auth.require_student()?;
            if row.student_id != auth.user_id {
                return Err(ApiError::forbidden("You can only cancel your own appointments"));
            }
            status_change_allowed(row.status, AppointmentStatus::Cancelled)
                .map_err(ApiError::InvalidStateTransition)?;
            if row.date < today() {
                return Err(ApiError::validation("Cannot cancel past appointments"));
            }
            "CANCEL_APPOINTMENT"
        }
        AppointmentStatus::Confirmed => {
            auth.require_admin()?;
            status_change_allowed(row.status, AppointmentStatus::Confirmed)
                .map_err(ApiError::InvalidStateTransition)?;
            "CONFIRM_APPOINTMENT"
        }
        AppointmentStatus::Completed => {
            return Err(ApiError::validation(
                "Appointments are completed by issuing a prescription",
            ));
        }
        AppointmentStatus::Pending => {
            return Err(ApiError::validation("Appointments cannot be moved back to PENDING"));
        }
    };

    // Guard on the status we just validated so a concurrent transition does
    // not get silently overwritten.
    let updated = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2, updated_at = now()
        WHERE appointment_id = $1
          AND status = $3
        "#,
    )
    .bind(appointment_id)
    .bind(req.status)
    .bind(row.status)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::InvalidStateTransition(
            "Appointment changed state concurrently, reload and retry".into(),
        ));
    }

    audit::record(
        &state.db,
        auth.user_id,
        action,
        json!({ "appointment_id": appointment_id, "from": row.status, "to": req.status }),
        &meta,
    )
    .await;

    let row = load_appointment(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: row.into_dto() }))
}

/* ============================================================
   DELETE /appointments/{id}  (student, PENDING only)
   ============================================================ */

fn ensure_deletable(status: AppointmentStatus) -> Result<(), ApiError> {
    if status == AppointmentStatus::Pending {
        Ok(())
    } else {
        Err(ApiError::validation(
            "Only pending appointments can be deleted, cancel instead",
        ))
    }
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    auth.require_student()?;

    let row = load_appointment(&state, appointment_id).await?;
    if row.student_id != auth.user_id {
        return Err(ApiError::forbidden("You can only delete your own appointments"));
    }
    ensure_deletable(row.status)?;

    // Guard on PENDING again in the delete itself; a concurrent confirmation
    // between the read and here must not be reported as a deletion.
    let deleted = sqlx::query(
        r#"DELETE FROM appointment WHERE appointment_id = $1 AND status = 0"#,
    )
    .bind(appointment_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::InvalidStateTransition(
            "Appointment changed state concurrently, reload and retry".into(),
        ));
    }

    audit::record(
        &state.db,
        auth.user_id,
        "DELETE_APPOINTMENT",
        json!({ "appointment_id": appointment_id }),
        &meta,
    )
    .await;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   GET /appointments/next  (student dashboard)
   ============================================================ */

pub async fn next_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Option<AppointmentDto>>>, ApiError> {
    auth.require_student()?;

    let sql = format!(
        r#"{APPOINTMENT_JOIN_SELECT}
        WHERE a.student_id = $1
          AND a.date >= $2
          AND a.status IN (0, 1)
        ORDER BY a.date ASC, array_position($3::text[], a.time_slot) ASC
        LIMIT 1
        "#
    );

    let row = sqlx::query_as::<_, AppointmentJoinRow>(&sql)
        .bind(auth.user_id)
        .bind(today())
        .bind(TIME_SLOTS.to_vec())
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: row.map(AppointmentJoinRow::into_dto),
    }))
}

/* ============================================================
   GET /appointments/counts  (student dashboard)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AppointmentCounts {
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub cancelled: i64,
}

pub async fn appointment_counts(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<AppointmentCounts>>, ApiError> {
    auth.require_student()?;

    let counts = sqlx::query_as::<_, AppointmentCounts>(
        r#"
        SELECT
          count(*)                            AS total,
          count(*) FILTER (WHERE status = 0)  AS pending,
          count(*) FILTER (WHERE status = 1)  AS confirmed,
          count(*) FILTER (WHERE status = 2)  AS completed,
          count(*) FILTER (WHERE status = 3)  AS cancelled
        FROM appointment
        WHERE student_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: counts }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_appointments_are_deletable() {
        assert!(ensure_deletable(AppointmentStatus::Pending).is_ok());
        assert!(ensure_deletable(AppointmentStatus::Confirmed).is_err());
        assert!(ensure_deletable(AppointmentStatus::Completed).is_err());
        assert!(ensure_deletable(AppointmentStatus::Cancelled).is_err());
    }
}
