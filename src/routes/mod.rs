use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod dashboard_routes;
pub mod doctor_routes;
pub mod pharmacy_routes;
pub mod prescription_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", prescription_routes::router())
        .nest("/api/v1", user_routes::router())
        .nest("/api/v1", doctor_routes::router())
        .nest("/api/v1", pharmacy_routes::router())
        .nest("/api/v1", dashboard_routes::router())
        .with_state(state)
}
