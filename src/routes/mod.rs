use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod home_routes;
pub mod medicine_routes;
pub mod page_actions;
pub mod pharmacy_routes;
pub mod session_routes;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(session_routes::router())
        .merge(home_routes::router())
        .merge(medicine_routes::router())
        .merge(pharmacy_routes::router())
        .merge(appointment_routes::router());

    Router::new()
        .nest("/api/v1", api)
        .merge(home_routes::health_router())
        .with_state(state)
}
