//! Operator authentication extractor.
//!
//! When `admin_password` is configured, requests must present it via
//! `Authorization: Bearer <password>`. Browsers cannot set headers on an
//! `EventSource`, so a `?token=<password>` query parameter is accepted too.
//! Without a configured password every request passes.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use crate::http::error::AppError;
use crate::state::AppState;

/// Authenticated operator marker. Extracting this validates the token.
pub struct Operator;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.auth.is_required() {
            return Ok(Operator);
        }

        let token = extract_token(parts)?;
        if state.auth.verify(&token) {
            Ok(Operator)
        } else {
            Err(AppError::Unauthorized("Invalid operator token".to_string()))
        }
    }
}

fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    if let Ok(Query(TokenQuery { token: Some(token) })) = Query::<TokenQuery>::try_from_uri(&parts.uri) {
        return Ok(token);
    }

    Err(AppError::Unauthorized(
        "Missing operator token. Provide via 'Authorization: Bearer <token>' header.".to_string(),
    ))
}
