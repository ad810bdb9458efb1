//! # Authgate
//!
//! `authgate` verifies user credentials and issues signed, time-bounded session
//! tokens.
//!
//! ## Brute-force throttling
//!
//! Failed logins are counted per identity in an in-process expiring cache. Once an
//! identity reaches the configured number of failures, further attempts are rejected
//! with a retry hint until the lockout window elapses. Every failure slides the window
//! forward; a successful login clears the counter. Attempt state is never written to
//! durable storage and does not survive a restart.
//!
//! ## Tokens
//!
//! Session tokens are HS256 JWTs carrying the user id and an absolute expiry. There is
//! no server-side session store: a token is valid as long as its signature checks out
//! and `exp` is in the future.
//!
//! ## Identity uniqueness
//!
//! The create/update flows run an advisory uniqueness check before writing. The
//! Postgres schema carries a `UNIQUE` constraint on `email`, and a violation raised by
//! the write itself is reported with the same field-keyed validation error.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod server;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
