//! Route handlers and the response envelope they share.
//!
//! Every JSON body except the login token and the health report is wrapped as
//! `{"data": ..., "errors": ..., "status": "ok" | "error"}`.

pub mod auth;
pub mod health;
pub mod users;

use crate::{
    auth::{AuthState, TokenError, ValidationErrors, VerifyError},
    store::{StoreError, UserRecord},
};
use axum::{
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};
use utoipa::ToSchema;

/// Body of every non-2xx response.
#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    #[schema(value_type = Option<Object>)]
    data: Option<Value>,
    /// A message, or messages keyed by field for validation failures.
    #[schema(value_type = Object)]
    errors: Value,
    status: String,
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    data: T,
    errors: Option<Value>,
    status: &'static str,
}

pub(crate) fn ok_response<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = Envelope {
        data,
        errors: None,
        status: "ok",
    };
    (status, Json(body)).into_response()
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorResponse {
        data: None,
        errors: Value::String(message.to_string()),
        status: "error".to_string(),
    };
    (status, Json(body)).into_response()
}

pub(crate) fn validation_response(errors: &ValidationErrors) -> Response {
    let body = ErrorResponse {
        data: None,
        errors: serde_json::to_value(errors).unwrap_or(Value::Null),
        status: "error".to_string(),
    };
    (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
}

pub(crate) fn verify_error_response(err: &VerifyError) -> Response {
    match err {
        VerifyError::TooManyAttempts { .. } => {
            let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, &err.to_string());
            if let Some(seconds) = err.retry_after_seconds() {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(seconds));
            }
            response
        }
        VerifyError::InvalidCredentials => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
        VerifyError::StorageUnavailable(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
        }
        VerifyError::SigningFailure(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
    }
}

/// Map a storage error raised by a write or lookup in a user handler.
pub(crate) fn store_error_response(err: &StoreError) -> Response {
    match err {
        StoreError::Conflict { field } => {
            validation_response(&ValidationErrors::single(field, err.to_string()))
        }
        StoreError::NotFound => error_response(StatusCode::NOT_FOUND, "User not found"),
        StoreError::UnknownField(_) => {
            error!("Unexpected storage error: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
        StoreError::Unavailable(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
        }
    }
}

/// Resolve the `Authorization: Bearer` token into the calling user.
///
/// # Errors
/// A ready-made 401 for missing, invalid, or expired tokens and for tokens whose user
/// no longer exists; 503 if the user lookup fails.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<UserRecord, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(error_response(StatusCode::UNAUTHORIZED, "Missing bearer token"));
    };

    let claims = match auth_state.issuer().decode(token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return Err(error_response(StatusCode::UNAUTHORIZED, "Token is expired"));
        }
        Err(err) => {
            debug!("Rejected bearer token: {err}");
            return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid token"));
        }
    };

    match auth_state.store().find_user_by_id(claims.user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(error_response(StatusCode::UNAUTHORIZED, "Invalid token")),
        Err(err) => Err(store_error_response(&err)),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn lockout_sets_retry_after() {
        let err = VerifyError::TooManyAttempts {
            retry_after: Duration::from_millis(299_500),
        };
        let response = verify_error_response(&err);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("300"))
        );
    }

    #[test]
    fn verify_errors_map_to_statuses() {
        assert_eq!(
            verify_error_response(&VerifyError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            verify_error_response(&VerifyError::StorageUnavailable(StoreError::NotFound))
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            verify_error_response(&VerifyError::SigningFailure(TokenError::EmptyKey)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn conflict_becomes_field_error() {
        let response = store_error_response(&StoreError::Conflict {
            field: "email".to_string(),
        });
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
