//! Release imagery upserts. One image per (release, source, type).

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{ImageType, ImagerySource, ReleaseImagery};

/// Fields for one imagery upsert.
#[derive(Debug, Clone)]
pub struct NewImagery<'a> {
    pub release_id: Uuid,
    pub source: ImagerySource,
    pub image_type: ImageType,
    pub small_url: Option<&'a str>,
    pub medium_url: Option<&'a str>,
    pub large_url: Option<&'a str>,
    pub source_id: Option<&'a str>,
    pub source_url: Option<&'a str>,
    pub checksum: Option<&'a str>,
    pub approved: bool,
}

pub async fn upsert_release_imagery(
    conn: &mut PgConnection,
    imagery: &NewImagery<'_>,
) -> Result<ReleaseImagery> {
    sqlx::query_as::<_, ReleaseImagery>(
        r#"
        INSERT INTO release_imagery (
            release_id, source, image_type,
            small_url, medium_url, large_url,
            source_id, source_url, checksum, approved
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (release_id, source, image_type) DO UPDATE SET
            small_url = EXCLUDED.small_url,
            medium_url = EXCLUDED.medium_url,
            large_url = EXCLUDED.large_url,
            source_id = EXCLUDED.source_id,
            source_url = EXCLUDED.source_url,
            checksum = COALESCE(EXCLUDED.checksum, release_imagery.checksum),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(imagery.release_id)
    .bind(imagery.source)
    .bind(imagery.image_type)
    .bind(imagery.small_url)
    .bind(imagery.medium_url)
    .bind(imagery.large_url)
    .bind(imagery.source_id)
    .bind(imagery.source_url)
    .bind(imagery.checksum)
    .bind(imagery.approved)
    .fetch_one(conn)
    .await
    .context("Failed to upsert release imagery")
}

pub async fn imagery_for_release(
    conn: &mut PgConnection,
    release_id: Uuid,
) -> Result<Vec<ReleaseImagery>> {
    sqlx::query_as::<_, ReleaseImagery>(
        "SELECT * FROM release_imagery WHERE release_id = $1 ORDER BY source, image_type",
    )
    .bind(release_id)
    .fetch_all(conn)
    .await
    .context("Failed to list imagery for release")
}
