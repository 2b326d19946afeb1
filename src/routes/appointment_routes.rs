// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};

use crate::{
    error::ApiError,
    middleware::session_context::SessionContext,
    models::{
        AddAppointmentView, ApiOk, AppState, AppointmentStatusView, BulkEditView,
        FieldValueRequest, FormView, SearchBody, SearchView, StageChangeRequest,
    },
    pages::{APPOINTMENT_BY_DOCTOR, AddAppointmentPage},
    routes::page_actions,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        // booking
        .route("/appointments/new", get(get_appointment_form))
        .route("/appointments/new/fields/{name}", put(set_appointment_field))
        .route("/appointments/new/submit", post(submit_appointment))
        .route("/appointments/new/reset", post(reset_appointment_form))
        // confirmation per doctor
        .route("/appointments/confirm", get(get_confirm))
        .route("/appointments/confirm/search", post(search_confirm))
        .route(
            "/appointments/confirm/changes",
            put(stage_confirm).delete(discard_confirm),
        )
        .route("/appointments/confirm/commit", post(commit_confirm))
        .route("/appointments/confirm/acknowledge", post(acknowledge_confirm))
        // status per patient
        .route("/appointments/status", get(get_status))
        .route("/appointments/status/fields/{name}", put(set_status_field))
        .route("/appointments/status/check", post(check_status))
}

fn add_view(page: &AddAppointmentPage) -> AddAppointmentView {
    AddAppointmentView {
        form: FormView::from(&page.form),
        doctors: page.doctors.results().to_vec(),
    }
}

/* ============================================================
   Booking
   ============================================================ */

pub async fn list_doctors(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<ApiOk<SearchView>>, ApiError> {
    let view = page_actions::run_search(
        session.pages().add_appointment.clone(),
        state.client.clone(),
        |p| Some(p.doctors.begin_list()),
        |p| SearchView::from(&p.doctors),
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn get_appointment_form(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<ApiOk<AddAppointmentView>>, ApiError> {
    // first visit loads the doctor picker
    let view = page_actions::run_search(
        session.pages().add_appointment.clone(),
        state.client.clone(),
        |p| p.doctors.last_request().is_none().then(|| p.doctors.begin_list()),
        add_view,
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn set_appointment_field(
    session: SessionContext,
    Path(name): Path<String>,
    Json(req): Json<FieldValueRequest>,
) -> Json<ApiOk<AddAppointmentView>> {
    let mut page = session.pages().add_appointment.lock().await;
    if let Err(err) = page.form.set_field(&name, req.value) {
        tracing::debug!(field = %name, error = %err, "appointment field rejected");
    }
    Json(ApiOk::new(add_view(&page)))
}

pub async fn submit_appointment(
    State(state): State<AppState>,
    session: SessionContext,
) -> Json<ApiOk<AddAppointmentView>> {
    let mut page = session.pages().add_appointment.lock().await;
    page.form.submit(state.client.as_ref()).await;
    Json(ApiOk::new(add_view(&page)))
}

pub async fn reset_appointment_form(session: SessionContext) -> Json<ApiOk<AddAppointmentView>> {
    let mut page = session.pages().add_appointment.lock().await;
    page.form.reset();
    Json(ApiOk::new(add_view(&page)))
}

/* ============================================================
   Confirmation
   ============================================================ */

pub async fn get_confirm(session: SessionContext) -> Json<ApiOk<BulkEditView>> {
    let page = session.pages().confirm_appointments.lock().await;
    Json(ApiOk::new(BulkEditView::from(&*page)))
}

pub async fn search_confirm(
    State(state): State<AppState>,
    session: SessionContext,
    Json(body): Json<SearchBody>,
) -> Result<Json<ApiOk<BulkEditView>>, ApiError> {
    let view = page_actions::bulk_search(
        session.pages().confirm_appointments.clone(),
        state.client.clone(),
        body.query,
        APPOINTMENT_BY_DOCTOR,
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn stage_confirm(
    session: SessionContext,
    Json(req): Json<StageChangeRequest>,
) -> Json<ApiOk<BulkEditView>> {
    Json(ApiOk::new(
        page_actions::stage(&session.pages().confirm_appointments, req).await,
    ))
}

pub async fn discard_confirm(session: SessionContext) -> Json<ApiOk<BulkEditView>> {
    Json(ApiOk::new(
        page_actions::discard(&session.pages().confirm_appointments).await,
    ))
}

pub async fn commit_confirm(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<ApiOk<BulkEditView>>, ApiError> {
    let view = page_actions::commit(
        session.pages().confirm_appointments.clone(),
        state.client.clone(),
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn acknowledge_confirm(session: SessionContext) -> Json<ApiOk<BulkEditView>> {
    Json(ApiOk::new(
        page_actions::acknowledge(&session.pages().confirm_appointments).await,
    ))
}

/* ============================================================
   Status per patient
   ============================================================ */

pub async fn get_status(session: SessionContext) -> Json<ApiOk<AppointmentStatusView>> {
    let page = session.pages().appointment_status.lock().await;
    Json(ApiOk::new(AppointmentStatusView::from(&*page)))
}

pub async fn set_status_field(
    session: SessionContext,
    Path(name): Path<String>,
    Json(req): Json<FieldValueRequest>,
) -> Json<ApiOk<AppointmentStatusView>> {
    let mut page = session.pages().appointment_status.lock().await;
    if let Err(err) = page.set_field(&name, req.value) {
        tracing::debug!(field = %name, error = %err, "status lookup field rejected");
    }
    Json(ApiOk::new(AppointmentStatusView::from(&*page)))
}

pub async fn check_status(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<ApiOk<AppointmentStatusView>>, ApiError> {
    let view = page_actions::run_search(
        session.pages().appointment_status.clone(),
        state.client.clone(),
        |p| p.begin_check().ok(),
        |p| AppointmentStatusView::from(p),
    )
    .await?;
    Ok(Json(ApiOk::new(view)))
}
