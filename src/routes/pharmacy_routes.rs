// src/routes/pharmacy_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    error::{is_unique_violation, ApiError},
    middleware::{auth_context::AuthContext, client_meta::ClientMeta},
    models::{ApiOk, AppState, MedicineRow},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pharmacy", get(list_medicines))
        .route("/pharmacy", post(create_medicine))
        .route("/pharmacy/{medicine_id}", patch(update_quantity))
}

/* ============================================================
   GET /pharmacy  (admin inventory view)
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PharmacyOverview {
    pub medications: Vec<MedicineRow>,
    pub total_medicines: usize,
    pub low_stock_items: usize,
}

pub async fn list_medicines(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
) -> Result<Json<ApiOk<PharmacyOverview>>, ApiError> {
    auth.require_admin()?;

    let medications = sqlx::query_as::<_, MedicineRow>(
        r#"
        SELECT medicine_id, name, category, quantity, threshold, dosage, price,
               created_at, updated_at
        FROM medicine
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let total_medicines = medications.len();
    let low_stock_items = medications.iter().filter(|m| m.is_low_stock()).count();

    audit::record(
        &state.db,
        auth.user_id,
        "VIEW_PHARMACY_ITEMS",
        json!({ "total": total_medicines, "low_stock": low_stock_items }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk {
        data: PharmacyOverview {
            medications,
            total_medicines,
            low_stock_items,
        },
    }))
}

/* ============================================================
   POST /pharmacy  (admin)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateMedicineRequest {
    pub name: String,
    pub category: String,
    pub quantity: i32,
    pub threshold: i32,
    pub dosage: Option<String>,
    pub price: Option<f64>,
}

pub async fn create_medicine(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(req): Json<CreateMedicineRequest>,
) -> Result<(StatusCode, Json<ApiOk<MedicineRow>>), ApiError> {
    auth.require_admin()?;

    let name = req.name.trim();
    let category = req.category.trim();
    if name.is_empty() || category.is_empty() {
        return Err(ApiError::validation("name and category are required"));
    }
    if req.quantity < 0 || req.threshold < 0 {
        return Err(ApiError::validation("quantity and threshold must not be negative"));
    }
    if req.price.is_some_and(|p| p < 0.0) {
        return Err(ApiError::validation("price must not be negative"));
    }

    let medicine = sqlx::query_as::<_, MedicineRow>(
        r#"
        INSERT INTO medicine (name, category, quantity, threshold, dosage, price)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING medicine_id, name, category, quantity, threshold, dosage, price,
                  created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(category)
    .bind(req.quantity)
    .bind(req.threshold)
    .bind(req.dosage.as_deref().unwrap_or("N/A"))
    .bind(req.price.unwrap_or(0.0))
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("DUPLICATE_MEDICINE", "A medicine with this name exists".into())
        } else {
            ApiError::db(e)
        }
    })?;

    audit::record(
        &state.db,
        auth.user_id,
        "CREATE_MEDICATION",
        json!({
            "medicine_id": medicine.medicine_id,
            "name": medicine.name,
            "category": medicine.category,
        }),
        &meta,
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiOk { data: medicine })))
}

/* ============================================================
   PATCH /pharmacy/{id}  (admin restock)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

pub async fn update_quantity(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(medicine_id): Path<Uuid>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<ApiOk<MedicineRow>>, ApiError> {
    auth.require_admin()?;

    if req.quantity < 0 {
        return Err(ApiError::validation("quantity must not be negative"));
    }

    let medicine = sqlx::query_as::<_, MedicineRow>(
        r#"
        UPDATE medicine
        SET quantity = $2, updated_at = now()
        WHERE medicine_id = $1
        RETURNING medicine_id, name, category, quantity, threshold, dosage, price,
                  created_at, updated_at
        "#,
    )
    .bind(medicine_id)
    .bind(req.quantity)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Medicine not found".into()))?;

    audit::record(
        &state.db,
        auth.user_id,
        "UPDATE_MEDICATION_QUANTITY",
        json!({
            "medicine_id": medicine.medicine_id,
            "name": medicine.name,
            "new_quantity": medicine.quantity,
        }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk { data: medicine }))
}
