//! Application configuration module
//!
//! Centralized, environment-aware configuration with validation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Production requires {0} to be set")]
    ProductionRequired(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Complete application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub spotify: Option<SpotifyCredentials>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let config = Self {
            environment,
            database: DatabaseSettings::from_env()?,
            cache: CacheSettings::from_env(),
            spotify: SpotifyCredentials::from_env(),
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    fn validate_production(&self) -> Result<(), ConfigError> {
        if self.database.url.contains("localhost") || self.database.url.contains("127.0.0.1") {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_URL".to_string(),
                message: "Production must not use localhost database".to_string(),
            });
        }
        Ok(())
    }
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Disable the prepared-statement cache when routing through a
    /// transaction-mode connection pooler (PgBouncer).
    pub pooler_compat: bool,
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingRequired("DATABASE_URL".to_string()))?;

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let pooler_compat = std::env::var("PGBOUNCER_COMPAT")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            url,
            max_connections,
            acquire_timeout: Duration::from_secs(30),
            pooler_compat,
        })
    }
}

/// Provider response cache configuration
#[derive(Clone)]
pub struct CacheSettings {
    /// Root directory for the on-disk cache; each provider gets a subtree.
    pub root: PathBuf,
    /// TTL for structured metadata (MusicBrainz, Cover Art Archive, iTunes,
    /// Spotify), in days.
    pub metadata_ttl_days: u32,
    /// TTL for scraped web pages (editorial site, Wikipedia), in days.
    pub page_ttl_days: u32,
    /// Bypass cache reads (but keep writing fresh entries).
    pub force_refresh: bool,
}

impl CacheSettings {
    pub fn from_env() -> Self {
        let root = std::env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cache"));

        Self {
            root,
            metadata_ttl_days: 30,
            page_ttl_days: 7,
            force_refresh: false,
        }
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

/// Spotify client-credentials configuration. Absent credentials disable the
/// Spotify matching pass rather than failing startup.
#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl SpotifyCredentials {
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID").ok()?;
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").ok()?;
        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_settings_default_ttls() {
        let settings = CacheSettings {
            root: PathBuf::from("cache"),
            metadata_ttl_days: 30,
            page_ttl_days: 7,
            force_refresh: false,
        };
        assert_eq!(settings.metadata_ttl_days, 30);
        assert_eq!(settings.page_ttl_days, 7);
        assert!(!settings.with_force_refresh(false).force_refresh);
    }

    #[test]
    fn environment_defaults_to_development() {
        // No ENVIRONMENT set in the test harness.
        if std::env::var("ENVIRONMENT").is_err() {
            assert_eq!(Environment::from_env(), Environment::Development);
        }
    }
}
