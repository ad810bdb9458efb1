//! Credential verification, attempt throttling, and session token issuance.
//!
//! ## Login flow
//!
//! 1. `AttemptLimiter::check` rejects identities that reached the failure threshold,
//!    before storage or the password hash are touched.
//! 2. The user record is looked up by identity; an unknown identity is verified
//!    against a dummy hash and reported exactly like a wrong password.
//! 3. Failures increment the identity's counter and slide its lockout window;
//!    a success deletes the counter.
//! 4. `TokenIssuer` signs an HS256 token carrying the user id and expiry.
//!
//! ## Uniqueness
//!
//! `UniquenessChecker` is a pre-write courtesy check. Concurrent writers can both pass
//! it; the storage constraint decides, and its violation is surfaced with the same
//! field-keyed validation error.

mod error;
pub mod limiter;
pub mod password;
mod state;
pub mod token;
pub mod unique;
pub mod validation;
pub mod verifier;

pub use error::VerifyError;
pub use limiter::{AttemptLimiter, AttemptRecord, AttemptStatus, AttemptStore, CacheError};
pub use state::{AuthConfig, AuthState};
pub use token::{SessionClaims, SignedToken, TokenError, TokenIssuer};
pub use unique::UniquenessChecker;
pub use validation::ValidationErrors;
pub use verifier::{CredentialVerifier, Subject};
