// src/routes/medicine_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};

use crate::{
    error::ApiError,
    middleware::session_context::SessionContext,
    models::{ApiOk, AppState, FieldValueRequest, FormView, SearchBody, SearchView},
    pages::MEDICINE_BY_NAME_OR_INGREDIENT,
    routes::page_actions,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/medicines", get(list_medicines))
        .route("/medicines/new", get(get_medicine_form))
        .route("/medicines/new/fields/{name}", put(set_medicine_field))
        .route("/medicines/new/submit", post(submit_medicine))
        .route("/medicines/new/reset", post(reset_medicine_form))
        .route(
            "/medicines/search",
            get(get_medicine_search).post(search_medicines),
        )
}

/* ============================================================
   Add medicine
   ============================================================ */

pub async fn get_medicine_form(session: SessionContext) -> Json<ApiOk<FormView>> {
    let page = session.pages().add_medicine.lock().await;
    Json(ApiOk::new(FormView::from(&*page)))
}

pub async fn set_medicine_field(
    session: SessionContext,
    Path(name): Path<String>,
    Json(req): Json<FieldValueRequest>,
) -> Json<ApiOk<FormView>> {
    let mut page = session.pages().add_medicine.lock().await;
    if let Err(err) = page.set_field(&name, req.value) {
        tracing::debug!(field = %name, error = %err, "medicine field rejected");
    }
    Json(ApiOk::new(FormView::from(&*page)))
}

pub async fn submit_medicine(
    State(state): State<AppState>,
    session: SessionContext,
) -> Json<ApiOk<FormView>> {
    let mut page = session.pages().add_medicine.lock().await;
    page.submit(state.client.as_ref()).await;
    Json(ApiOk::new(FormView::from(&*page)))
}

pub async fn reset_medicine_form(session: SessionContext) -> Json<ApiOk<FormView>> {
    let mut page = session.pages().add_medicine.lock().await;
    page.reset();
    Json(ApiOk::new(FormView::from(&*page)))
}

/* ============================================================
   List / search
   ============================================================ */

pub async fn list_medicines(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<ApiOk<SearchView>>, ApiError> {
    let view = page_actions::list(
        session.pages().medicine_list.clone(),
        state.client.clone(),
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn get_medicine_search(session: SessionContext) -> Json<ApiOk<SearchView>> {
    let page = session.pages().medicine_search.lock().await;
    Json(ApiOk::new(SearchView::from(&*page)))
}

pub async fn search_medicines(
    State(state): State<AppState>,
    session: SessionContext,
    Json(body): Json<SearchBody>,
) -> Result<Json<ApiOk<SearchView>>, ApiError> {
    let view = page_actions::search(
        session.pages().medicine_search.clone(),
        state.client.clone(),
        body.query,
        MEDICINE_BY_NAME_OR_INGREDIENT,
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}
