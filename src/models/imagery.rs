use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a release image came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "imagery_source", rename_all = "snake_case")]
pub enum ImagerySource {
    CoverArtArchive,
    Itunes,
}

impl ImagerySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagerySource::CoverArtArchive => "cover_art_archive",
            ImagerySource::Itunes => "itunes",
        }
    }
}

impl std::fmt::Display for ImagerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Front or back cover.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "image_type", rename_all = "lowercase")]
pub enum ImageType {
    Front,
    Back,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Front => "front",
            ImageType::Back => "back",
        }
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cover art for a release. One image per (release, source, type), the
/// central uniqueness contract of the imagery table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReleaseImagery {
    pub id: Uuid,
    pub release_id: Uuid,
    pub source: ImagerySource,
    pub image_type: ImageType,
    pub small_url: Option<String>,
    pub medium_url: Option<String>,
    pub large_url: Option<String>,
    pub source_id: Option<String>,
    pub source_url: Option<String>,
    pub checksum: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
