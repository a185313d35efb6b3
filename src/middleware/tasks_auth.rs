// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trigger authentication middleware for `/tasks/*` routes.

use crate::config::TRIGGER_TOKEN_HEADER;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require the shared trigger token header.
///
/// With no token configured the routes stay closed; the in-process scheduler
/// still runs the jobs.
pub async fn require_trigger_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.trigger_token.as_deref() else {
        tracing::warn!(
            path = %request.uri().path(),
            "Blocked tasks request: no trigger token configured"
        );
        return Err(StatusCode::FORBIDDEN);
    };

    let presented = request
        .headers()
        .get(TRIGGER_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    let matches = presented
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())));

    if !matches {
        tracing::warn!(
            path = %request.uri().path(),
            present = presented.is_some(),
            "Blocked tasks request with invalid trigger token"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
