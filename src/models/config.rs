//! Runtime configuration for Pothole Patrol
//!
//! Everything comes from environment variables (a `.env` file is loaded by
//! the binary). Defaults are tuned for local development; `APP_ENV=prod`
//! makes the secret key mandatory and switches logs to JSON.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    AT_DEFAULT_BASE_URL, DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_API_RATE_LIMIT_PER_MINUTE,
    DEFAULT_REFRESH_TOKEN_TTL_SECS,
};

/// Development-only signing key, never accepted in production
const DEV_SECRET_KEY: &str = "dev-insecure-pothole-patrol-signing-key";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(AppError::invalid_config(format!(
                "Invalid APP_ENV='{}'. Must be one of: dev, prod",
                other
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Africa's Talking credentials
#[derive(Debug, Clone)]
pub struct AirtimeConfig {
    pub username: String,
    /// Never logged
    pub api_key: String,
    pub base_url: String,
}

/// Staff account created at startup if it does not exist yet
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
    pub phone: String,
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// HS256 signing key for JWTs
    pub secret_key: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Approve every image with a fixed high score (development)
    pub ai_bypass: bool,
    pub media_root: PathBuf,
    pub media_url: String,
    /// JSON snapshot of the store, if persistence is wanted
    pub data_path: Option<PathBuf>,
    pub airtime: AirtimeConfig,
    pub admin: Option<AdminBootstrap>,
    /// Max differing hash bits still considered the same image
    pub duplicate_hamming_threshold: u32,
    pub api_rate_limit_per_minute: u32,
    pub log_format: LogFormat,
    /// Empty means any origin
    pub cors_allow_origins: Vec<String>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env_opt(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::invalid_config(format!("Invalid value for {}: {}", name, raw))),
        None => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> AppResult<bool> {
    match env_opt(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::invalid_config(format!(
                "Invalid boolean for {}: {}",
                name, raw
            ))),
        },
        None => Ok(default),
    }
}

impl AppConfig {
    /// Read configuration from the environment
    pub fn from_env() -> AppResult<Self> {
        let environment = Environment::parse(&env_opt("APP_ENV").unwrap_or_else(|| "dev".into()))?;
        let is_prod = environment == Environment::Prod;

        let secret_key = match env_opt("SECRET_KEY") {
            Some(key) => key,
            None if is_prod => return Err(AppError::missing_env("SECRET_KEY")),
            None => DEV_SECRET_KEY.to_string(),
        };

        // Hosting platforms set PORT; POTHOLE_PORT is the local override
        let port = match env_opt("PORT").or_else(|| env_opt("POTHOLE_PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::invalid_config(format!("Invalid port: {}", raw)))?,
            None => 8080,
        };

        let admin = match (env_opt("ADMIN_USERNAME"), env_opt("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                username,
                password,
                phone: env_opt("ADMIN_PHONE").unwrap_or_else(|| "0200000000".to_string()),
            }),
            (Some(_), None) => return Err(AppError::missing_env("ADMIN_PASSWORD")),
            _ => None,
        };

        let log_format = match env_opt("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("compact") => LogFormat::Compact,
            Some(other) => {
                return Err(AppError::invalid_config(format!(
                    "Invalid LOG_FORMAT: {}",
                    other
                )))
            }
            None if is_prod => LogFormat::Json,
            None => LogFormat::Compact,
        };

        let cors_allow_origins = env_opt("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty() && o != "*")
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            environment,
            host: env_opt("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            debug: env_bool("DEBUG", !is_prod)?,
            secret_key,
            access_token_ttl: Duration::from_secs(env_parse(
                "ACCESS_TOKEN_TTL_SECS",
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
            )?),
            refresh_token_ttl: Duration::from_secs(env_parse(
                "REFRESH_TOKEN_TTL_SECS",
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
            )?),
            ai_bypass: env_bool("AI_BYPASS", false)?,
            media_root: PathBuf::from(env_opt("MEDIA_ROOT").unwrap_or_else(|| "./media".into())),
            media_url: env_opt("MEDIA_URL")
                .unwrap_or_else(|| "/media".into())
                .trim_end_matches('/')
                .to_string(),
            data_path: env_opt("DATA_PATH").map(PathBuf::from),
            airtime: AirtimeConfig {
                username: env_opt("AT_USERNAME").unwrap_or_default(),
                api_key: env_opt("AT_API_KEY").unwrap_or_default(),
                base_url: env_opt("AT_BASE_URL")
                    .unwrap_or_else(|| AT_DEFAULT_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            admin,
            duplicate_hamming_threshold: env_parse("DUPLICATE_HAMMING_THRESHOLD", 0)?,
            api_rate_limit_per_minute: env_parse(
                "API_RATE_LIMIT_PER_MINUTE",
                DEFAULT_API_RATE_LIMIT_PER_MINUTE,
            )?,
            log_format,
            cors_allow_origins,
        })
    }

    /// Configuration used by tests: temp media dir, no persistence
    pub fn for_tests(media_root: PathBuf) -> Self {
        Self {
            environment: Environment::Dev,
            host: "127.0.0.1".to_string(),
            port: 0,
            debug: true,
            secret_key: "test-secret-key".to_string(),
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            ai_bypass: false,
            media_root,
            media_url: "/media".to_string(),
            data_path: None,
            airtime: AirtimeConfig {
                username: "sandbox".to_string(),
                api_key: String::new(),
                base_url: "http://127.0.0.1:9".to_string(),
            },
            admin: None,
            duplicate_hamming_threshold: 0,
            api_rate_limit_per_minute: 10_000,
            log_format: LogFormat::Compact,
            cors_allow_origins: Vec::new(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Prod
    }

    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| AppError::invalid_config(format!("Invalid bind address {}:{}", self.host, self.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("dev").unwrap(), Environment::Dev);
        assert_eq!(Environment::parse(" PROD ").unwrap(), Environment::Prod);
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn test_for_tests_defaults() {
        let cfg = AppConfig::for_tests(PathBuf::from("/tmp/media"));
        assert!(!cfg.is_production());
        assert_eq!(cfg.access_token_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.refresh_token_ttl, Duration::from_secs(90 * 24 * 3600));
        assert!(cfg.socket_addr().is_ok());
    }
}
