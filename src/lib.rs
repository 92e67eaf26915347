//! Jazz discography ingestion and enrichment pipeline
//!
//! Given a seed song, discovers and reconciles composer, recording, release,
//! performer, instrument, cover art, and streaming-link metadata from a
//! fixed set of external providers, writing idempotently into a relational
//! store.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repo;
pub mod services;

// Re-export commonly used types
pub use config::{
    AppConfig, CacheSettings, ConfigError, DatabaseSettings, Environment, SpotifyCredentials,
};
pub use database::{create_pool, health_check, DatabasePool};
pub use error::{PipelineError, ProviderError};
pub use models::*;
pub use services::cache::{CacheKey, CacheLookup, FsCache, MemoryCache, ResponseCache};
pub use services::clients::{
    CoverArtClient, ItunesClient, JazzStandardsClient, MusicBrainzClient, RateGate, RetryPolicy,
    SpotifyClient, WikimediaClient,
};
pub use services::importer::portraits::PortraitFetcher;
pub use services::importer::{
    ImportStats, ImportSummary, ImporterOptions, SongEnricher, SongSeed,
};
pub use services::verifier::{Confidence, ReferenceVerifier, Verification, VerificationContext};
