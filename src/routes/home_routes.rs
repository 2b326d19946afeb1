use axum::{Json, Router, http::StatusCode, routing::get};

use crate::middleware::session_context::SessionContext;
use crate::models::{ApiOk, AppState};
use crate::pages::{DIRECTORY, PageInfo};

#[derive(serde::Serialize)]
pub struct HomeData {
    pub view: String,
    pub pages: &'static [PageInfo],
}

pub fn router() -> Router<AppState> {
    Router::new().route("/home", get(home))
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub async fn home(_session: SessionContext) -> Json<ApiOk<HomeData>> {
    Json(ApiOk::new(HomeData {
        view: "pharmacy_desk".to_string(),
        pages: DIRECTORY,
    }))
}

/// Liveness only; the backend is not checked.
pub async fn health() -> StatusCode {
    StatusCode::OK
}
