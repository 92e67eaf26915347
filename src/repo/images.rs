//! Licensed performer portraits and their link table.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{ArtistImage, Image, ImageLicense};

/// Fields for a portrait upsert, unique on the image URL.
#[derive(Debug, Clone)]
pub struct NewImage<'a> {
    pub url: &'a str,
    pub caption: Option<&'a str>,
    pub license: ImageLicense,
    pub license_details: Option<&'a str>,
    pub attribution: Option<&'a str>,
    pub source_page_url: Option<&'a str>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

pub async fn upsert_image(conn: &mut PgConnection, image: &NewImage<'_>) -> Result<Image> {
    sqlx::query_as::<_, Image>(
        r#"
        INSERT INTO images (
            url, caption, license, license_details, attribution,
            source_page_url, width, height
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (url) DO UPDATE SET
            caption = COALESCE(images.caption, EXCLUDED.caption),
            license = EXCLUDED.license,
            license_details = COALESCE(EXCLUDED.license_details, images.license_details),
            attribution = COALESCE(EXCLUDED.attribution, images.attribution),
            source_page_url = COALESCE(EXCLUDED.source_page_url, images.source_page_url),
            width = COALESCE(EXCLUDED.width, images.width),
            height = COALESCE(EXCLUDED.height, images.height),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(image.url)
    .bind(image.caption)
    .bind(image.license)
    .bind(image.license_details)
    .bind(image.attribution)
    .bind(image.source_page_url)
    .bind(image.width)
    .bind(image.height)
    .fetch_one(conn)
    .await
    .context("Failed to upsert image")
}

/// Link a portrait to a performer, unique per (performer, image).
pub async fn link_artist_image(
    conn: &mut PgConnection,
    performer_id: Uuid,
    image_id: Uuid,
    is_primary: bool,
) -> Result<ArtistImage> {
    sqlx::query_as::<_, ArtistImage>(
        r#"
        INSERT INTO artist_images (performer_id, image_id, is_primary)
        VALUES ($1, $2, $3)
        ON CONFLICT (performer_id, image_id) DO UPDATE SET
            is_primary = EXCLUDED.is_primary
        RETURNING *
        "#,
    )
    .bind(performer_id)
    .bind(image_id)
    .bind(is_primary)
    .fetch_one(conn)
    .await
    .context("Failed to link artist image")
}

pub async fn performer_has_portrait(
    conn: &mut PgConnection,
    performer_id: Uuid,
) -> Result<bool> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM artist_images WHERE performer_id = $1 LIMIT 1")
            .bind(performer_id)
            .fetch_optional(conn)
            .await
            .context("Failed to check for existing portrait")?;
    Ok(row.is_some())
}
