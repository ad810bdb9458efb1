use crate::auth::AuthState;
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
    Extension, Json, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, info, info_span, Span};
use ulid::Ulid;

pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::{auth, health, users};

/// Build the application router around a shared `AuthState`.
#[must_use]
pub fn router(auth_state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/auth", get(auth::current_user).post(auth::login))
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:user_id",
            get(users::show).put(users::update).delete(users::delete),
        )
        .route("/openapi.json", get(|| async { Json(openapi()) }))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, auth_state: Arc<AuthState>) -> Result<()> {
    let sweeper = spawn_attempt_sweeper(&auth_state);

    let app = router(auth_state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    sweeper.abort();

    Ok(())
}

/// Periodically drop expired attempt counters so identities that never come back do
/// not accumulate. Lookups already ignore expired entries; this only reclaims memory.
fn spawn_attempt_sweeper(auth_state: &Arc<AuthState>) -> JoinHandle<()> {
    let attempts = Arc::clone(auth_state.attempts());
    let period = auth_state
        .config()
        .lockout_window()
        .max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = attempts.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged expired login attempt counters");
            }
        }
    })
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::AuthConfig,
        store::{MemoryUserStore, UserStore},
    };
    use secrecy::SecretString;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_counters() {
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let state = Arc::new(AuthState::new(
            AuthConfig::new().with_lockout_seconds(60),
            SecretString::from("s3cret".to_string()),
            store,
        ));
        state
            .attempts()
            .set("attempt:a@x.com", 3, Duration::from_secs(30));

        let sweeper = spawn_attempt_sweeper(&state);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(state.attempts().is_empty());
        sweeper.abort();
    }
}
