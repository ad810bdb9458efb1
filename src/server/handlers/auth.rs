//! Login and current-user endpoints.

use super::{
    error_response, ok_response, require_auth, validation_response, verify_error_response,
    ErrorResponse,
};
use crate::{
    auth::{validation::normalize_identity, AuthState, ValidationErrors},
    store::UserRecord,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
    /// Expiry, seconds since the Unix epoch.
    pub expires_at: i64,
}

#[utoipa::path(
    post,
    path = "/auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = TokenResponse),
        (status = 400, description = "Missing or malformed payload", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse,
            headers(("Retry-After" = u64, description = "Seconds until the lockout ends"))),
        (status = 503, description = "User storage unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_identity(&request.email);

    let mut errors = ValidationErrors::new();
    errors.require_email("email", &email);
    errors.require_present("password", &request.password);
    if errors.has_any() {
        return validation_response(&errors);
    }

    match auth_state.login(&email, &request.password).await {
        Ok(signed) => (
            StatusCode::OK,
            Json(TokenResponse {
                token: signed.token,
                expires_at: signed.claims.exp,
            }),
        )
            .into_response(),
        Err(err) => verify_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/auth",
    responses(
        (status = 200, description = "The authenticated user", body = UserRecord),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn current_user(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_auth(&headers, &auth_state).await {
        Ok(user) => ok_response(StatusCode::OK, user),
        Err(response) => response,
    }
}
