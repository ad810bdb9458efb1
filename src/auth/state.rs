use super::{
    error::VerifyError,
    limiter::{AttemptLimiter, AttemptStore},
    token::{SignedToken, TokenIssuer},
    unique::UniquenessChecker,
    verifier::CredentialVerifier,
};
use crate::{cache::ExpiringCache, store::UserStore};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::error;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: u64 = 300;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    max_attempts: u32,
    lockout_seconds: u64,
    token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }

    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Values below 1 are raised to 1; a zero window would never lock anyone out.
    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: u64) -> Self {
        self.lockout_seconds = seconds.max(1);
        self
    }

    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lockout_window(&self) -> Duration {
        Duration::from_secs(self.lockout_seconds)
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }
}

/// Everything a request handler needs to authenticate users, shared behind an `Arc`.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn UserStore>,
    attempts: Arc<ExpiringCache<u32>>,
    verifier: CredentialVerifier,
    issuer: TokenIssuer,
    uniqueness: UniquenessChecker,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, jwt_secret: SecretString, store: Arc<dyn UserStore>) -> Self {
        let attempts = Arc::new(ExpiringCache::new());
        let attempt_store: Arc<dyn AttemptStore> = attempts.clone();
        let limiter = Arc::new(AttemptLimiter::new(
            attempt_store,
            config.max_attempts(),
            config.lockout_window(),
        ));

        Self {
            verifier: CredentialVerifier::new(Arc::clone(&store), limiter),
            issuer: TokenIssuer::new(jwt_secret, config.token_ttl_seconds()),
            uniqueness: UniquenessChecker::new(Arc::clone(&store)),
            attempts,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Attempt counters, exposed so the server can sweep expired entries.
    #[must_use]
    pub fn attempts(&self) -> &Arc<ExpiringCache<u32>> {
        &self.attempts
    }

    #[must_use]
    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn uniqueness(&self) -> &UniquenessChecker {
        &self.uniqueness
    }

    /// Verify credentials and mint a session token for the subject.
    ///
    /// # Errors
    /// Any `VerifyError` from verification, or `SigningFailure` if the token cannot
    /// be signed.
    pub async fn login(&self, identity: &str, secret: &str) -> Result<SignedToken, VerifyError> {
        let subject = self.verifier.verify(identity, secret).await?;
        self.issuer.issue(subject.user_id).map_err(|err| {
            error!("Failed to sign session token: {err}");
            VerifyError::SigningFailure(err)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        auth::password::hash_password,
        store::{MemoryUserStore, NewUser},
    };

    async fn state_with_user(secret: &str) -> (AuthState, i64) {
        let store = Arc::new(MemoryUserStore::new());
        let user = store
            .insert_user(NewUser {
                name: "alice".to_string(),
                email: "a@x.com".to_string(),
                password_hash: hash_password("pw1").unwrap(),
                access_level: Some(1),
            })
            .await
            .unwrap();
        let state = AuthState::new(
            AuthConfig::new().with_max_attempts(3),
            SecretString::from(secret.to_string()),
            store,
        );
        (state, user.id)
    }

    #[test]
    fn defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.lockout_window(), Duration::from_secs(300));
        assert_eq!(config.token_ttl_seconds(), 604_800);
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new()
            .with_max_attempts(3)
            .with_lockout_seconds(60)
            .with_token_ttl_seconds(3600);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.lockout_window(), Duration::from_secs(60));
        assert_eq!(config.token_ttl_seconds(), 3600);
    }

    #[test]
    fn builder_raises_values_below_one() {
        let config = AuthConfig::new()
            .with_max_attempts(0)
            .with_lockout_seconds(0)
            .with_token_ttl_seconds(-5);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.lockout_window(), Duration::from_secs(1));
        assert_eq!(config.token_ttl_seconds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_lockout_still_throttles() {
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        store
            .insert_user(NewUser {
                name: "alice".to_string(),
                email: "a@x.com".to_string(),
                password_hash: hash_password("pw1").unwrap(),
                access_level: Some(1),
            })
            .await
            .unwrap();
        let state = AuthState::new(
            AuthConfig::new().with_max_attempts(3).with_lockout_seconds(0),
            SecretString::from("s3cret".to_string()),
            store,
        );

        for _ in 0..3 {
            let _ = state.login("a@x.com", "bad").await;
        }
        let err = state.login("a@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, VerifyError::TooManyAttempts { .. }));
    }

    #[tokio::test]
    async fn login_issues_token_for_subject() {
        let (state, id) = state_with_user("s3cret").await;
        let signed = state.login("a@x.com", "pw1").await.unwrap();
        let claims = state.issuer().decode(&signed.token).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[tokio::test]
    async fn login_uses_configured_threshold() {
        let (state, _) = state_with_user("s3cret").await;
        for _ in 0..3 {
            let _ = state.login("a@x.com", "bad").await;
        }
        let err = state.login("a@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, VerifyError::TooManyAttempts { .. }));
    }

    #[tokio::test]
    async fn unusable_signing_key_is_a_signing_failure() {
        let (state, _) = state_with_user("").await;
        let err = state.login("a@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, VerifyError::SigningFailure(_)));
    }
}
