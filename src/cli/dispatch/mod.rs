//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth::{
    ARG_ADMIN_EMAIL, ARG_ADMIN_PASSWORD, ARG_JWT_SECRET, ARG_LOCKOUT_SECONDS, ARG_MAX_ATTEMPTS,
    ARG_TOKEN_TTL_SECONDS,
};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or the signing secret is empty.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();

    let jwt_secret = matches
        .get_one::<String>(ARG_JWT_SECRET)
        .cloned()
        .context("missing required argument: --jwt-secret")?;
    if jwt_secret.trim().is_empty() {
        bail!("--{ARG_JWT_SECRET} must not be empty");
    }

    let admin = match (
        matches.get_one::<String>(ARG_ADMIN_EMAIL),
        matches.get_one::<String>(ARG_ADMIN_PASSWORD),
    ) {
        (Some(email), Some(password)) => {
            Some((email.clone(), SecretString::from(password.clone())))
        }
        _ => None,
    };

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: SecretString::from(jwt_secret),
        max_attempts: matches
            .get_one::<u32>(ARG_MAX_ATTEMPTS)
            .copied()
            .unwrap_or(5),
        lockout_seconds: matches
            .get_one::<u64>(ARG_LOCKOUT_SECONDS)
            .copied()
            .unwrap_or(300),
        token_ttl_seconds: matches
            .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(604_800),
        admin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    fn matches_from(args: &[&str]) -> clap::ArgMatches {
        commands::new().get_matches_from(args.iter().copied())
    }

    #[test]
    fn builds_server_action() -> Result<()> {
        temp_env::with_vars(
            [
                ("AUTHGATE_DSN", None::<&str>),
                ("AUTHGATE_ADMIN_EMAIL", None),
                ("AUTHGATE_ADMIN_PASSWORD", None),
            ],
            || {
                let matches = matches_from(&[
                    "authgate",
                    "--jwt-secret",
                    "s3cret",
                    "--max-attempts",
                    "3",
                    "--admin-email",
                    "admin@x.com",
                    "--admin-password",
                    "password",
                ]);
                let Action::Server(args) = handler(&matches)?;

                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, None);
                assert_eq!(args.jwt_secret.expose_secret(), "s3cret");
                assert_eq!(args.max_attempts, 3);
                assert_eq!(
                    args.admin.as_ref().map(|(email, _)| email.as_str()),
                    Some("admin@x.com")
                );
                Ok(())
            },
        )
    }

    #[test]
    fn rejects_blank_secret() {
        let matches = matches_from(&["authgate", "--jwt-secret", "  "]);
        assert!(handler(&matches).is_err());
    }
}
