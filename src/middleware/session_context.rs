use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::AppState;
use crate::pages::Pages;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: Arc<Session>,
    pub token_hash: String,
}

impl SessionContext {
    pub fn pages(&self) -> &Pages {
        &self.session.pages
    }
}

impl FromRequestParts<AppState> for SessionContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Extract Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());

            let session = state
                .sessions
                .lookup(&token_hash)
                .await
                .ok_or_else(ApiError::session_expired)?;

            Ok(SessionContext {
                session,
                token_hash,
            })
        }
    }
}
