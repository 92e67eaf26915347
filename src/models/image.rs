use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized license for a performer portrait. Source archives report a
/// zoo of license strings; everything outside the closed set maps to
/// `Unknown`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "image_license", rename_all = "kebab-case")]
pub enum ImageLicense {
    PublicDomain,
    Cc0,
    CcBy,
    CcBySa,
    Gfdl,
    Unknown,
}

impl ImageLicense {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageLicense::PublicDomain => "public-domain",
            ImageLicense::Cc0 => "cc0",
            ImageLicense::CcBy => "cc-by",
            ImageLicense::CcBySa => "cc-by-sa",
            ImageLicense::Gfdl => "gfdl",
            ImageLicense::Unknown => "unknown",
        }
    }

    /// Normalize a raw license string from the image archive.
    /// CC-BY-SA is checked before CC-BY so the longer variant wins.
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("cc-by-sa") || lower.contains("cc by-sa") {
            ImageLicense::CcBySa
        } else if lower.contains("cc-by") || lower.contains("cc by") {
            ImageLicense::CcBy
        } else if lower.contains("cc0") || lower.contains("cc zero") {
            ImageLicense::Cc0
        } else if lower.contains("public domain") || lower.contains("pd-") {
            ImageLicense::PublicDomain
        } else if lower.contains("gfdl") || lower.contains("gnu free documentation") {
            ImageLicense::Gfdl
        } else {
            ImageLicense::Unknown
        }
    }
}

impl std::fmt::Display for ImageLicense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A licensed performer portrait. Unique on `url`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: Uuid,
    pub url: String,
    pub caption: Option<String>,
    pub license: ImageLicense,
    pub license_details: Option<String>,
    pub attribution: Option<String>,
    pub source_page_url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link row: portrait attached to a performer. Unique per (performer, image).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArtistImage {
    pub id: Uuid,
    pub performer_id: Uuid,
    pub image_id: Uuid,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_normalization() {
        assert_eq!(
            ImageLicense::normalize("Creative Commons CC-BY-SA 4.0"),
            ImageLicense::CcBySa
        );
        assert_eq!(ImageLicense::normalize("cc by 2.0"), ImageLicense::CcBy);
        assert_eq!(ImageLicense::normalize("CC0 1.0"), ImageLicense::Cc0);
        assert_eq!(
            ImageLicense::normalize("Public domain (US government work)"),
            ImageLicense::PublicDomain
        );
        assert_eq!(ImageLicense::normalize("GFDL 1.2"), ImageLicense::Gfdl);
        assert_eq!(ImageLicense::normalize("fair use"), ImageLicense::Unknown);
        assert_eq!(ImageLicense::normalize(""), ImageLicense::Unknown);
    }
}
