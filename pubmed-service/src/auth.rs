use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use pubmed_flow::ResponseEnvelope;
use tracing::{info, warn};

use crate::service::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity attached to every request that passed the token gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Option<String>,
}

/// Guards the `/api` routes when `PUBMED_API_TOKEN` is configured. Without a
/// configured token every request passes.
pub async fn require_authorization(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.config.api_token.as_deref() {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {}
            _ => {
                warn!(path = %request.uri().path(), "Rejected unauthenticated request");
                return unauthorized();
            }
        }
    }

    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    info!(
        method = %request.method(),
        path = %request.uri().path(),
        user = user_id.as_deref().unwrap_or("anonymous"),
        "API request"
    );

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id });

    next.run(request).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ResponseEnvelope::failure("Unauthorized")),
    )
        .into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
