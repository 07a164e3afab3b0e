//! Runtime Configuration
//! Mission: Load signing, storage and server settings once at startup

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::warn;

/// Fallback secret, accepted only in development mode
const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

/// Runtime mode. Controls whether internal error detail reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "prod")]
    Production,
}

impl RunMode {
    pub fn is_development(self) -> bool {
        self == RunMode::Development
    }
}

/// Command line / environment arguments for the server binary
#[derive(Debug, Parser)]
#[command(name = "rth-admin", about = "RTH Bandung admin authentication service")]
pub struct ServerArgs {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind_addr: String,

    /// SQLite database path (":memory:" for an ephemeral store)
    #[arg(long, env = "DATABASE_URL", default_value = "rth_admin.db")]
    pub database_url: String,

    /// HMAC secret used to sign session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Token lifetime, e.g. "24h", "30m", "7d" or plain seconds
    #[arg(long, env = "JWT_EXPIRES_IN", default_value = "24h")]
    pub jwt_expires_in: String,

    #[arg(long, env = "APP_ENV", value_enum, default_value_t = RunMode::Production)]
    pub app_env: RunMode,

    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// How often expired revocation entries are purged
    #[arg(long, env = "REVOCATION_PURGE_INTERVAL_SECS", default_value_t = 60)]
    pub purge_interval_secs: u64,

    #[arg(long, env = "BOOTSTRAP_ADMIN_USERNAME")]
    pub bootstrap_username: Option<String>,

    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_password: Option<String>,
}

/// Credentials for the first administrator, created when the store is empty
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

/// Resolved process-wide configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub run_mode: RunMode,
    pub bcrypt_cost: u32,
    pub purge_interval: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    /// Production defaults around a given signing secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            database_url: "rth_admin.db".to_string(),
            jwt_secret: secret.into(),
            token_ttl: Duration::from_secs(24 * 3600),
            run_mode: RunMode::Production,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            purge_interval: Duration::from_secs(60),
            bootstrap_admin: None,
        }
    }

    pub fn expose_error_detail(&self) -> bool {
        self.run_mode.is_development()
    }
}

impl TryFrom<ServerArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServerArgs) -> Result<Self> {
        let jwt_secret = match args.jwt_secret.filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None if args.app_env.is_development() => {
                warn!("⚠️  JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            }
            None => bail!("JWT_SECRET must be set outside development mode"),
        };

        let token_ttl = parse_expiry(&args.jwt_expires_in)
            .with_context(|| format!("Invalid JWT_EXPIRES_IN: {}", args.jwt_expires_in))?;

        if !(4..=31).contains(&args.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {}", args.bcrypt_cost);
        }

        let bootstrap_admin = match (args.bootstrap_username, args.bootstrap_password) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            _ => bail!("BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            bind_addr: args.bind_addr,
            database_url: args.database_url,
            jwt_secret,
            token_ttl,
            run_mode: args.app_env,
            bcrypt_cost: args.bcrypt_cost,
            purge_interval: Duration::from_secs(args.purge_interval_secs.max(1)),
            bootstrap_admin,
        })
    }
}

/// Parse a token lifetime such as "24h", "30m", "7d", "45s" or "3600"
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("empty duration");
    }

    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let split = raw.char_indices().last().map(|(idx, _)| idx).unwrap_or(0);
    let (value, unit) = raw.split_at(split);
    let value: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid duration value in {:?}", raw))?;

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        other => bail!("unknown duration unit {:?}", other),
    };

    if value == 0 {
        bail!("duration must be positive");
    }

    let secs = value
        .checked_mul(multiplier)
        .with_context(|| format!("duration {:?} is too large", raw))?;
    Ok(Duration::from_secs(secs))
}
