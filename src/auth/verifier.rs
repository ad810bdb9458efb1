//! Throttled credential verification.

use super::{
    error::VerifyError,
    limiter::AttemptLimiter,
    password::{verify_dummy, verify_password},
    validation::normalize_identity,
};
use crate::store::UserStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info_span, warn, Instrument};

/// The authenticated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub user_id: i64,
    pub identity: String,
}

pub struct CredentialVerifier {
    store: Arc<dyn UserStore>,
    limiter: Arc<AttemptLimiter>,
    // One entry per identity with a verification in flight.
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, limiter: Arc<AttemptLimiter>) -> Self {
        Self {
            store,
            limiter,
            in_flight: DashMap::new(),
        }
    }

    /// Check `secret` for `identity`.
    ///
    /// A locked-out identity is rejected before storage is consulted and its window
    /// is left untouched. A wrong secret and an unknown identity both count as a
    /// failure and return the same error.
    ///
    /// Attempts for the same identity run one at a time, so a burst cannot get more
    /// than the configured number of guesses past the limiter. Different identities
    /// never wait on each other.
    ///
    /// # Errors
    /// * `TooManyAttempts` while the identity is locked out
    /// * `InvalidCredentials` for an unknown identity or wrong secret
    /// * `StorageUnavailable` if the user lookup fails (nothing is counted)
    pub async fn verify(&self, identity: &str, secret: &str) -> Result<Subject, VerifyError> {
        let identity = normalize_identity(identity);

        let lock = Arc::clone(self.in_flight.entry(identity.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.verify_serialized(&identity, secret).await
        };
        drop(lock);
        // The map holds the last reference once nobody is waiting.
        self.in_flight.remove_if(&identity, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn verify_serialized(
        &self,
        identity: &str,
        secret: &str,
    ) -> Result<Subject, VerifyError> {
        let status = self.limiter.check(identity);
        if status.blocked {
            warn!(
                retry_after_seconds = status.retry_after.as_secs(),
                "Rejected login for locked out identity"
            );
            return Err(VerifyError::TooManyAttempts {
                retry_after: status.retry_after,
            });
        }

        let user = self
            .store
            .find_user_by_identity(identity)
            .instrument(info_span!("verify.lookup"))
            .await
            .map_err(|err| {
                error!("Failed to look up user: {err}");
                VerifyError::StorageUnavailable(err)
            })?;

        let subject = match user {
            Some(user) => check_password(secret, Some(user.password_hash))
                .await
                .then(|| Subject {
                    user_id: user.id,
                    identity: identity.to_string(),
                }),
            None => {
                check_password(secret, None).await;
                None
            }
        };

        if let Some(subject) = subject {
            self.limiter.record_success(identity);
            debug!(user_id = subject.user_id, "Credentials verified");
            Ok(subject)
        } else {
            self.limiter.record_failure(identity);
            Err(VerifyError::InvalidCredentials)
        }
    }
}

/// Run the Argon2 comparison off the async workers. Without a stored hash the dummy
/// hash is verified instead and the result is always `false`.
async fn check_password(secret: &str, stored_hash: Option<String>) -> bool {
    let secret = secret.to_string();
    let outcome = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&secret, &hash),
        None => {
            verify_dummy(&secret);
            Ok(false)
        }
    })
    .await;

    match outcome {
        Ok(Ok(matched)) => matched,
        Ok(Err(err)) => {
            error!("Stored password hash is unusable: {err}");
            false
        }
        Err(err) => {
            error!("Password verification task failed: {err}");
            false
        }
    }
}
