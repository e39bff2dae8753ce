// src/routes/dashboard_routes.rs
//
// Read-only reporting views over the other modules' tables. No invariants of
// their own.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;

use crate::{
    audit,
    error::ApiError,
    middleware::{auth_context::AuthContext, client_meta::ClientMeta},
    models::{today, ApiOk, AppState},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/admin", get(admin_dashboard))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminDashboard {
    pub total_students: i64,
    pub total_doctors: i64,
    pub today_total: i64,
    pub today_completed: i64,
    pub today_remaining: i64,
    pub low_stock_items: i64,
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
) -> Result<Json<ApiOk<AdminDashboard>>, ApiError> {
    auth.require_admin()?;

    let dashboard = sqlx::query_as::<_, AdminDashboard>(
        r#"
        SELECT
          (SELECT count(*) FROM app_user WHERE role = 0) AS total_students,
          (SELECT count(*) FROM app_user WHERE role = 2) AS total_doctors,
          (SELECT count(*) FROM appointment WHERE date = $1) AS today_total,
          (SELECT count(*) FROM appointment WHERE date = $1 AND status = 2)
              AS today_completed,
          (SELECT count(*) FROM appointment WHERE date = $1 AND status <> 2)
              AS today_remaining,
          (SELECT count(*) FROM medicine WHERE quantity <= threshold) AS low_stock_items
        "#,
    )
    .bind(today())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    audit::record(
        &state.db,
        auth.user_id,
        "VIEW_ADMIN_DASHBOARD",
        json!({ "today_total": dashboard.today_total }),
        &meta,
    )
    .await;

    Ok(Json(ApiOk { data: dashboard }))
}
