use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::{AppState, errors::AppError, models::Claims, utils::decode_jwt};

/// Access gate for mutating book routes.
///
/// Expects `Authorization: Bearer <token>`; on success the decoded [`Claims`]
/// are placed in the request extensions.
///
/// # Errors
/// Returns unauthorized if the header is missing or malformed, or the token is invalid or expired.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;
    let claims: Claims = decode_jwt(token.trim(), &state.config)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
