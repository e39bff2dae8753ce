// src/routes/prescription_routes.rs

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    audit,
    error::{is_unique_violation, ApiError},
    middleware::{auth_context::AuthContext, client_meta::ClientMeta},
    models::{ApiOk, AppState, AppointmentStatus},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prescriptions", post(create_prescription))
        .route("/prescriptions/medicines", get(list_prescribable_medicines))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MedicationLineDto {
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
}

#[derive(Debug, Serialize)]
pub struct PrescriptionDto {
    pub prescription_id: Uuid,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub student_id: Uuid,
    pub diagnosis: String,
    pub notes: String,
    pub medications: Vec<MedicationLineDto>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PrescriptionRow {
    prescription_id: Uuid,
    appointment_id: Uuid,
    doctor_id: Uuid,
    student_id: Uuid,
    diagnosis: String,
    notes: String,
    created_at: DateTime<Utc>,
}

/// Load a prescription (with its medication lines) for an appointment, if one
/// was issued. Shared with the appointment detail view.
pub async fn fetch_prescription_for_appointment(
    db: &PgPool,
    appointment_id: Uuid,
) -> Result<Option<PrescriptionDto>, ApiError> {
    let Some(row) = sqlx::query_as::<_, PrescriptionRow>(
        r#"
        SELECT prescription_id, appointment_id, doctor_id, student_id,
               diagnosis, notes, created_at
        FROM prescription
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?
    else {
        return Ok(None);
    };

    let medications = sqlx::query_as::<_, MedicationLineDto>(
        r#"
        SELECT pm.medicine_id, m.name AS medicine_name,
               pm.dosage, pm.frequency, pm.duration, pm.instructions
        FROM prescription_medication pm
        JOIN medicine m ON m.medicine_id = pm.medicine_id
        WHERE pm.prescription_id = $1
        ORDER BY m.name ASC
        "#,
    )
    .bind(row.prescription_id)
    .fetch_all(db)
    .await
    .map_err(ApiError::db)?;

    Ok(Some(PrescriptionDto {
        prescription_id: row.prescription_id,
        appointment_id: row.appointment_id,
        doctor_id: row.doctor_id,
        student_id: row.student_id,
        diagnosis: row.diagnosis,
        notes: row.notes,
        medications,
        created_at: row.created_at,
    }))
}

/* ============================================================
   POST /prescriptions
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct MedicationLineRequest {
    pub medicine_id: Uuid,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: Uuid,
    pub diagnosis: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub medications: Vec<MedicationLineRequest>,
}

#[derive(Debug, sqlx::FromRow)]
struct LockedAppointment {
    student_id: Uuid,
    status: AppointmentStatus,
}

/// Issue a prescription and complete the appointment, all-or-nothing. The
/// appointment row is locked for the duration so the status flip cannot race
/// a concurrent transition, and any unknown medicine id rolls the whole
/// transaction back.
pub async fn create_prescription(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(req): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<ApiOk<PrescriptionDto>>), ApiError> {
    auth.require_doctor()?;

    let diagnosis = req.diagnosis.trim();
    if diagnosis.is_empty() {
        return Err(ApiError::validation("diagnosis is required"));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // Ownership is folded into the lookup: another doctor's appointment is
    // indistinguishable from a missing one.
    let appointment: LockedAppointment = sqlx::query_as(
        r#"
        SELECT student_id, status
        FROM appointment
        WHERE appointment_id = $1
          AND doctor_id = $2
        FOR UPDATE
        "#,
    )
    .bind(req.appointment_id)
    .bind(auth.user_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Appointment not found or access denied".into()))?;

    if !appointment.status.completable() {
        return Err(ApiError::InvalidStateTransition(format!(
            "Cannot prescribe for a {} appointment",
            appointment.status.as_str().to_lowercase()
        )));
    }

    let prescription_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO prescription (appointment_id, doctor_id, student_id, diagnosis, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING prescription_id
        "#,
    )
    .bind(req.appointment_id)
    .bind(auth.user_id)
    .bind(appointment.student_id)
    .bind(diagnosis)
    .bind(req.notes.as_deref().unwrap_or(""))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict(
                "ALREADY_PRESCRIBED",
                "Prescription already exists for this appointment".into(),
            )
        } else {
            ApiError::db(e)
        }
    })?;

    for line in &req.medications {
        let known: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM medicine WHERE medicine_id = $1)"#,
        )
        .bind(line.medicine_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(ApiError::db)?;
        if !known {
            // Dropping the open transaction rolls back the prescription row
            // and any lines written so far.
            return Err(ApiError::BadRequest(
                "UNKNOWN_MEDICINE",
                format!("Medicine {} does not exist", line.medicine_id),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO prescription_medication
                (prescription_id, medicine_id, dosage, frequency, duration, instructions)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(prescription_id)
        .bind(line.medicine_id)
        .bind(&line.dosage)
        .bind(&line.frequency)
        .bind(&line.duration)
        .bind(line.instructions.as_deref().unwrap_or(""))
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;
    }

    sqlx::query(
        r#"
        UPDATE appointment
        SET status = 2, updated_at = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(req.appointment_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    audit::record(
        &state.db,
        auth.user_id,
        "CREATE_PRESCRIPTION",
        json!({
            "prescription_id": prescription_id,
            "appointment_id": req.appointment_id,
            "medication_count": req.medications.len(),
        }),
        &meta,
    )
    .await;

    let dto = fetch_prescription_for_appointment(&state.db, req.appointment_id)
        .await?
        .ok_or_else(|| ApiError::Internal("prescription vanished after commit".into()))?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: dto })))
}

/* ============================================================
   GET /prescriptions/medicines  (prescription form)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PrescribableMedicine {
    pub medicine_id: Uuid,
    pub name: String,
    pub category: String,
    pub dosage: String,
    pub quantity: i32,
}

pub async fn list_prescribable_medicines(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<PrescribableMedicine>>>, ApiError> {
    auth.require_doctor()?;

    let medicines = sqlx::query_as::<_, PrescribableMedicine>(
        r#"
        SELECT medicine_id, name, category, dosage, quantity
        FROM medicine
        WHERE quantity > 0
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: medicines }))
}
