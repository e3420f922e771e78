use std::env;

use chrono::Duration;

const MAX_MATCH_POOL_LIMIT: i64 = 10_000;
const MAX_ESCALATION_HOURS: i64 = 87_600;
const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(#[from] env::VarError),

    #[error("{key} must be an integer in 1..={max}, got {value:?}")]
    OutOfRange {
        key: &'static str,
        value: String,
        max: i64,
    },
}

/// Which `ItemStore` implementation backs the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub store_backend: StoreBackend,
    pub run_migrations: bool,
    pub identifier_token_secret: Option<String>,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub match_pool_limit: i64,
    pub escalation_hours: i64,
    pub retention_days: i64,
    pub retention_sweep_minutes: u64,
    pub r2_bucket: Option<String>,
    pub r2_account_id: Option<String>,
    pub r2_access_key: Option<String>,
    pub r2_secret_key: Option<String>,
    pub r2_public_url: Option<String>,
    pub classifier_url: Option<String>,
    pub notify_webhook_url: Option<String>,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Positive integer setting with an upper bound; absent means `default`.
fn bounded(key: &'static str, raw: Option<String>, default: i64, max: i64) -> Result<i64, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.trim().parse::<i64>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(ConfigError::OutOfRange { key, value, max }),
    }
}

fn bounded_env(key: &'static str, default: i64, max: i64) -> Result<i64, ConfigError> {
    bounded(key, env::var(key).ok(), default, max)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(env::var("DATABASE_URL")?),
            StoreBackend::Memory => env::var("DATABASE_URL").ok(),
        };

        Ok(Config {
            database_url,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_or("SERVER_PORT", 50051),
            jwt_secret: env::var("JWT_SECRET")?,
            store_backend,
            run_migrations: parse_or("RUN_MIGRATIONS", false),
            identifier_token_secret: env::var("IDENTIFIER_TOKEN_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            argon2_memory_kib: parse_or("ARGON2_MEMORY_KIB", argon2::Params::DEFAULT_M_COST),
            argon2_iterations: parse_or("ARGON2_ITERATIONS", argon2::Params::DEFAULT_T_COST),
            argon2_parallelism: parse_or("ARGON2_PARALLELISM", argon2::Params::DEFAULT_P_COST),
            match_pool_limit: bounded_env("MATCH_POOL_LIMIT", 200, MAX_MATCH_POOL_LIMIT)?,
            escalation_hours: bounded_env("ESCALATION_HOURS", 24, MAX_ESCALATION_HOURS)?,
            retention_days: bounded_env("RETENTION_DAYS", 30, MAX_RETENTION_DAYS)?,
            retention_sweep_minutes: parse_or("RETENTION_SWEEP_MINUTES", 60),
            r2_bucket: env::var("R2_BUCKET").ok(),
            r2_account_id: env::var("R2_ACCOUNT_ID").ok(),
            r2_access_key: env::var("R2_ACCESS_KEY").ok(),
            r2_secret_key: env::var("R2_SECRET_KEY").ok(),
            r2_public_url: env::var("R2_PUBLIC_BASE_URL").ok(),
            classifier_url: env::var("CLASSIFIER_URL").ok(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn escalation_threshold(&self) -> Duration {
        Duration::hours(self.escalation_hours.clamp(1, MAX_ESCALATION_HOURS))
    }

    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days.clamp(1, MAX_RETENTION_DAYS))
    }
}
