//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use axum::http::HeaderValue;
use logosnap_core::{CapacityPolicy, SessionConfig, MAX_FAVORITES};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which backend produces the logo images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageProvider {
    /// Random placeholder pictures; needs no credentials.
    Placeholder,
    OpenAi,
}

impl FromStr for ImageProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("'{}' is not one of placeholder, openai", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub image_provider: ImageProvider,
    pub openai_api_key: Option<String>,
    pub image_model: String,
    pub download_dir: PathBuf,
    pub cors_origin: HeaderValue,
    pub credits_per_purchase: u32,
    pub favorites_capacity: usize,
    pub favorites_policy: CapacityPolicy,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(std::env::vars().collect())
    }

    /// Builds the configuration from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |name: &str| vars.get(name).cloned();

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin_str =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());
        let cors_origin = cors_origin_str.parse::<HeaderValue>().map_err(|e| {
            ConfigError::InvalidValue(
                "CORS_ORIGIN".to_string(),
                format!("'{}': {}", cors_origin_str.escape_debug(), e),
            )
        })?;

        // --- Storage Settings ---
        // Without a database, favorites only live as long as the process.
        let database_url = var("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let download_dir = var("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./downloads"));

        // --- Image Generation Settings ---
        let image_provider = var("IMAGE_PROVIDER")
            .unwrap_or_else(|| "placeholder".to_string())
            .parse::<ImageProvider>()
            .map_err(|e| ConfigError::InvalidValue("IMAGE_PROVIDER".to_string(), e))?;
        let openai_api_key = var("OPENAI_API_KEY").filter(|s| !s.trim().is_empty());
        if image_provider == ImageProvider::OpenAi && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY".to_string()));
        }
        let image_model = var("IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string());

        // --- Session Settings ---
        let credits_per_purchase = parse_or("CREDITS_PER_PURCHASE", var("CREDITS_PER_PURCHASE"), 5u32)?;
        let favorites_capacity =
            parse_or("FAVORITES_CAPACITY", var("FAVORITES_CAPACITY"), MAX_FAVORITES)?;
        let favorites_policy = match var("FAVORITES_POLICY")
            .unwrap_or_else(|| "reject".to_string())
            .to_lowercase()
            .as_str()
        {
            "reject" => CapacityPolicy::Reject,
            "evict-oldest" => CapacityPolicy::EvictOldest,
            other => {
                return Err(ConfigError::InvalidValue(
                    "FAVORITES_POLICY".to_string(),
                    format!("'{}' is not one of reject, evict-oldest", other),
                ))
            }
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            image_provider,
            openai_api_key,
            image_model,
            download_dir,
            cors_origin,
            credits_per_purchase,
            favorites_capacity,
            favorites_policy,
        })
    }

    /// The part of the configuration the session controller cares about.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            credits_per_purchase: self.credits_per_purchase,
            favorites_capacity: self.favorites_capacity,
            capacity_policy: self.favorites_policy,
        }
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
