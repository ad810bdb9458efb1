use crate::{
    auth::{password::hash_password, validation::normalize_identity, AuthConfig, AuthState},
    server,
    store::{MemoryUserStore, NewUser, PgUserStore, StoreError, UserStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub jwt_secret: SecretString,
    pub max_attempts: u32,
    pub lockout_seconds: u64,
    pub token_ttl_seconds: i64,
    /// Administrator created at startup when missing: email and password.
    pub admin: Option<(String, SecretString)>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the administrator cannot be
/// created, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = connect_store(args.dsn.as_deref()).await?;

    if let Some((email, password)) = &args.admin {
        seed_admin(store.as_ref(), email, password).await?;
    }

    let config = AuthConfig::new()
        .with_max_attempts(args.max_attempts)
        .with_lockout_seconds(args.lockout_seconds)
        .with_token_ttl_seconds(args.token_ttl_seconds);

    let auth_state = Arc::new(AuthState::new(config, args.jwt_secret, store));

    server::new(args.port, auth_state).await
}

async fn connect_store(dsn: Option<&str>) -> Result<Arc<dyn UserStore>> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, users are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryUserStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    Ok(Arc::new(PgUserStore::new(pool)))
}

/// Create the administrator unless a user already owns `email`.
///
/// Returns `true` if a user was created.
///
/// # Errors
/// Returns an error if storage fails or the password cannot be hashed.
pub async fn seed_admin(
    store: &dyn UserStore,
    email: &str,
    password: &SecretString,
) -> Result<bool> {
    let email = normalize_identity(email);
    if store.count_where("email", &email, None).await? > 0 {
        info!("Administrator already exists");
        return Ok(false);
    }

    let secret = password.expose_secret().to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&secret))
        .await
        .context("Password hashing task failed")?
        .context("Failed to hash administrator password")?;

    let admin = NewUser {
        name: "admin".to_string(),
        email,
        password_hash,
        access_level: None,
    };

    match store.insert_user(admin).await {
        Ok(user) => {
            info!(user_id = user.id, "Administrator created");
            Ok(true)
        }
        // Another instance created it between the check and the insert.
        Err(StoreError::Conflict { .. }) => Ok(false),
        Err(err) => Err(err).context("Could not create administrator"),
    }
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "in-memory".to_string(), redact_dsn),
        ),
        ("max_attempts", args.max_attempts.to_string()),
        ("lockout_seconds", args.lockout_seconds.to_string()),
        ("token_ttl_seconds", args.token_ttl_seconds.to_string()),
        ("admin_seed", args.admin.is_some().to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
