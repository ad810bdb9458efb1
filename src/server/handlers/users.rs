//! User management endpoints. Every route requires a bearer token.

use super::{
    error_response, ok_response, require_auth, store_error_response, validation_response,
    ErrorResponse,
};
use crate::{
    auth::{password::hash_password, validation::normalize_identity, AuthState, ValidationErrors},
    store::{NewUser, UserChanges, UserRecord},
};
use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;
const MAX_ACCESS_LEVEL: i32 = 5;

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// 1-based page number.
    page: Option<i64>,
    per_page: Option<i64>,
}

impl Pagination {
    fn limit_offset(&self) -> (i64, i64) {
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1).saturating_mul(per_page))
    }
}

#[derive(ToSchema, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_confirmation: String,
    access_level: Option<i32>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct UpdateUserRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[utoipa::path(
    get,
    path = "/users",
    params(Pagination),
    responses(
        (status = 200, description = "One page of users", body = [UserRecord]),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Query(pagination): Query<Pagination>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &auth_state).await {
        return response;
    }

    let (limit, offset) = pagination.limit_offset();
    match auth_state.store().list_users(limit, offset).await {
        Ok(users) => ok_response(StatusCode::OK, users),
        Err(err) => store_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "The user", body = UserRecord),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn show(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &auth_state).await {
        return response;
    }

    match auth_state.store().find_user_by_id(user_id).await {
        Ok(Some(user)) => ok_response(StatusCode::OK, user),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => store_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserRecord),
        (status = 400, description = "Missing or malformed payload", body = ErrorResponse),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateUserRequest>>,
) -> impl IntoResponse {
    let caller = match require_auth(&headers, &auth_state).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let request: CreateUserRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let name = request.name.trim().to_string();
    let email = normalize_identity(&request.email);

    let mut errors = ValidationErrors::new();
    errors.require_present("name", &name);
    errors.require_length("name", &name, 3, 100);
    errors.require_email("email", &email);
    if !email.is_empty() {
        auth_state
            .uniqueness()
            .validate("email", &email, None, &mut errors)
            .await;
    }
    errors.require_int_present("access_level", request.access_level);
    errors.require_less_than("access_level", request.access_level, MAX_ACCESS_LEVEL);
    errors.require_present("password", &request.password);
    errors.require_match(
        "password",
        &request.password,
        &request.password_confirmation,
        "Password and confirmation did not match.",
    );
    if errors.has_any() {
        return validation_response(&errors);
    }

    let password_hash = match hash_secret(request.password).await {
        Ok(hash) => hash,
        Err(response) => return response,
    };

    let new_user = NewUser {
        name,
        email,
        password_hash,
        access_level: request.access_level,
    };

    match auth_state.store().insert_user(new_user).await {
        Ok(user) => {
            info!(user_id = user.id, created_by = caller.id, "User created");
            ok_response(StatusCode::CREATED, user)
        }
        Err(err) => store_error_response(&err),
    }
}

#[utoipa::path(
    put,
    path = "/users/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserRecord),
        (status = 400, description = "Missing or malformed payload", body = ErrorResponse),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Path(user_id): Path<i64>,
    payload: Option<Json<UpdateUserRequest>>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &auth_state).await {
        return response;
    }

    match auth_state.store().find_user_by_id(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => return store_error_response(&err),
    }

    let request: UpdateUserRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let name = request.name.trim().to_string();
    let email = normalize_identity(&request.email);

    let mut errors = ValidationErrors::new();
    errors.require_present("name", &name);
    errors.require_email("email", &email);
    errors.require_length("name", &name, 3, 100);
    if !email.is_empty() {
        auth_state
            .uniqueness()
            .validate("email", &email, Some(user_id), &mut errors)
            .await;
    }
    if errors.has_any() {
        return validation_response(&errors);
    }

    match auth_state
        .store()
        .update_user(user_id, UserChanges { name, email })
        .await
    {
        Ok(user) => ok_response(StatusCode::OK, user),
        Err(err) => store_error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Callers cannot delete themselves", body = ErrorResponse),
        (status = 401, description = "Missing, invalid, or expired token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    let caller = match require_auth(&headers, &auth_state).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    if caller.id == user_id {
        return error_response(StatusCode::BAD_REQUEST, "can not delete your own account");
    }

    match auth_state.store().delete_user(user_id).await {
        Ok(()) => {
            info!(user_id, deleted_by = caller.id, "User deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => store_error_response(&err),
    }
}

async fn hash_secret(password: String) -> Result<String, Response> {
    match tokio::task::spawn_blocking(move || hash_password(&password)).await {
        Ok(Ok(hash)) => Ok(hash),
        Ok(Err(err)) => {
            error!("Failed to hash password: {err}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ))
        }
        Err(err) => {
            error!("Password hashing task failed: {err}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_bounds() {
        let default = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(default.limit_offset(), (20, 0));

        let third = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(third.limit_offset(), (10, 20));

        let clamped = Pagination {
            page: Some(0),
            per_page: Some(1_000),
        };
        assert_eq!(clamped.limit_offset(), (100, 0));
    }
}
