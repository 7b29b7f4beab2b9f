use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use common::errors::AppError;
use common::models::Claims;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::handlers::AppState;

/// Middleware to validate the bearer JWT and stash its claims on the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let secret = state
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::auth("Admin API is disabled"))?;

    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::auth("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::auth("Invalid Authorization header format"))?;

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| AppError::auth(format!("Invalid token: {}", e)))?;

    request.extensions_mut().insert(token_data.claims);

    Ok(next.run(request).await)
}

/// Middleware to require the admin role
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::authorization("No claims found in request"))?;

    if claims.role != "admin" {
        return Err(AppError::authorization(
            "Admin role required for this endpoint",
        ));
    }

    tracing::debug!(sub = %claims.sub, "Admin request authorized");
    Ok(next.run(request).await)
}
