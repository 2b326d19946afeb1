// src/routes/pharmacy_routes.rs

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};

use crate::{
    error::ApiError,
    middleware::session_context::SessionContext,
    models::{ApiOk, AppState, BulkEditView, SearchBody, StageChangeRequest},
    pages::MEDICINE_BY_PHARMACY,
    routes::page_actions,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pharmacy/availability", get(get_availability))
        .route("/pharmacy/availability/search", post(search_availability))
        .route(
            "/pharmacy/availability/changes",
            put(stage_availability).delete(discard_availability),
        )
        .route("/pharmacy/availability/commit", post(commit_availability))
        .route("/pharmacy/availability/acknowledge", post(acknowledge_availability))
}

pub async fn get_availability(session: SessionContext) -> Json<ApiOk<BulkEditView>> {
    let page = session.pages().availability.lock().await;
    Json(ApiOk::new(BulkEditView::from(&*page)))
}

pub async fn search_availability(
    State(state): State<AppState>,
    session: SessionContext,
    Json(body): Json<SearchBody>,
) -> Result<Json<ApiOk<BulkEditView>>, ApiError> {
    let view = page_actions::bulk_search(
        session.pages().availability.clone(),
        state.client.clone(),
        body.query,
        MEDICINE_BY_PHARMACY,
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn stage_availability(
    session: SessionContext,
    Json(req): Json<StageChangeRequest>,
) -> Json<ApiOk<BulkEditView>> {
    Json(ApiOk::new(page_actions::stage(&session.pages().availability, req).await))
}

pub async fn discard_availability(session: SessionContext) -> Json<ApiOk<BulkEditView>> {
    Json(ApiOk::new(page_actions::discard(&session.pages().availability).await))
}

pub async fn commit_availability(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<ApiOk<BulkEditView>>, ApiError> {
    let view = page_actions::commit(
        session.pages().availability.clone(),
        state.client.clone(),
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn acknowledge_availability(session: SessionContext) -> Json<ApiOk<BulkEditView>> {
    Json(ApiOk::new(page_actions::acknowledge(&session.pages().availability).await))
}
