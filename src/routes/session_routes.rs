use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    middleware::session_context::SessionContext,
    models::{ApiOk, AppState, OkData, SessionInfo, SessionOpened},
    session::Session,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/current", get(current_session))
        .route("/sessions/logout", post(logout))
}

fn session_info(session: &Session) -> SessionInfo {
    SessionInfo {
        session_id: session.session_id,
        created_at: session.created_at,
        expires_at: session.expires_at,
    }
}

pub async fn open_session(State(state): State<AppState>) -> Json<ApiOk<SessionOpened>> {
    let (access_token, session) = state.sessions.open(state.session_ttl_hours).await;
    tracing::info!(session_id = %session.session_id, "session opened");

    Json(ApiOk::new(SessionOpened {
        access_token,
        session: session_info(&session),
    }))
}

pub async fn current_session(session: SessionContext) -> Json<ApiOk<SessionInfo>> {
    Json(ApiOk::new(session_info(&session.session)))
}

/// Drops the session together with every page's state.
pub async fn logout(
    State(state): State<AppState>,
    session: SessionContext,
) -> Json<ApiOk<OkData>> {
    let ok = state.sessions.revoke(&session.token_hash).await;
    tracing::info!(session_id = %session.session.session_id, "session closed");
    Json(ApiOk::new(OkData { ok }))
}
