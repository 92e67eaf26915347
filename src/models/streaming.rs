use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consumer streaming services the pipeline links against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "streaming_service", rename_all = "snake_case")]
pub enum StreamingService {
    Spotify,
    AppleMusic,
}

impl StreamingService {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamingService::Spotify => "spotify",
            StreamingService::AppleMusic => "apple_music",
        }
    }
}

impl std::fmt::Display for StreamingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a streaming link was established. Rows with `Manual` were curated by
/// a human and are never overwritten by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "match_method", rename_all = "snake_case")]
pub enum MatchMethod {
    Manual,
    FuzzySearch,
    RepairScript,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Manual => "manual",
            MatchMethod::FuzzySearch => "fuzzy_search",
            MatchMethod::RepairScript => "repair_script",
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Album-level streaming link. Unique per (release, service).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReleaseStreamingLink {
    pub id: Uuid,
    pub release_id: Uuid,
    pub service: StreamingService,
    pub service_id: String,
    pub service_url: String,
    pub match_method: MatchMethod,
    pub matched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Track-level streaming link, keyed by the recording↔release row.
/// Unique per (recording_release, service).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecordingReleaseStreamingLink {
    pub id: Uuid,
    pub recording_release_id: Uuid,
    pub service: StreamingService,
    pub service_id: String,
    pub service_url: String,
    pub match_method: MatchMethod,
    pub matched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
