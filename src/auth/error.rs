use super::token::TokenError;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// The identity is locked out; `retry_after` is the time left in the window.
    #[error("Too many attempts. Please try again in {} minutes", .retry_after.as_secs() / 60)]
    TooManyAttempts { retry_after: Duration },
    /// Unknown identity or wrong secret. The two cases are deliberately identical.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("storage unavailable")]
    StorageUnavailable(#[source] StoreError),
    #[error("failed to sign session token")]
    SigningFailure(#[source] TokenError),
}

impl VerifyError {
    /// Retry hint in whole seconds, rounded up so clients never retry too early.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::TooManyAttempts { retry_after } => {
                let seconds = retry_after.as_secs();
                Some(if retry_after.subsec_nanos() > 0 {
                    seconds + 1
                } else {
                    seconds
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_attempts_message_uses_whole_minutes() {
        let err = VerifyError::TooManyAttempts {
            retry_after: Duration::from_secs(299),
        };
        assert_eq!(
            err.to_string(),
            "Too many attempts. Please try again in 4 minutes"
        );
    }

    #[test]
    fn retry_after_seconds_rounds_up() {
        let err = VerifyError::TooManyAttempts {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.retry_after_seconds(), Some(2));
        assert_eq!(VerifyError::InvalidCredentials.retry_after_seconds(), None);
    }
}
