// src/config.rs

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use dotenvy::dotenv;

/// Requests per second and burst size for the `/auth` rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub per_second: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub jwt_expiration: u64,
    /// HMAC key for confirmation codes.
    pub confirmation_secret: String,
    /// How long a confirmation code stays valid, in seconds.
    pub confirmation_code_ttl: u64,
    pub bind_addr: String,
    pub email_from: String,
    /// When set, outgoing mail is written to this directory instead of the log.
    pub mail_dir: Option<PathBuf>,
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub auth_rate_limit: Option<RateLimit>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let confirmation_secret = env::var("CONFIRMATION_SECRET")
            .unwrap_or_else(|_| jwt_secret.clone());

        let auth_rate_limit = match (
            parse_var::<u64>("AUTH_RATE_PER_SECOND"),
            parse_var::<u32>("AUTH_RATE_BURST"),
        ) {
            (Some(per_second), Some(burst)) => Some(RateLimit { per_second, burst }),
            _ => None,
        };

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_var("JWT_EXPIRATION").unwrap_or(86_400),
            confirmation_secret,
            confirmation_code_ttl: parse_var("CONFIRMATION_CODE_TTL").unwrap_or(259_200),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@titlehub.local".to_string()),
            mail_dir: env::var("MAIL_DIR").ok().map(PathBuf::from),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            auth_rate_limit,
        }
    }

    /// Configuration for tests and local tooling: fixed secrets, no seeding, no rate limit.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            jwt_secret: "test_secret_for_integration_tests".to_string(),
            jwt_expiration: 600,
            confirmation_secret: "test_confirmation_secret".to_string(),
            confirmation_code_ttl: 3_600,
            bind_addr: "127.0.0.1:0".to_string(),
            email_from: "noreply@titlehub.test".to_string(),
            mail_dir: None,
            admin_username: None,
            admin_email: None,
            auth_rate_limit: None,
        }
    }
}

/// Reads and parses an optional variable. Unparseable values are logged and ignored.
fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    parse_value(key, env::var(key).ok())
}

fn parse_value<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
