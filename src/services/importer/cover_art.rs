//! Cover-art polling.
//!
//! Polls the art archive for releases that have never been checked, writes
//! imagery rows (first image per type wins), and stamps
//! `cover_art_checked_at` whether or not art came back. Negative polls are
//! what keep the backfill from re-querying empty releases forever.

use std::collections::HashSet;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::models::{ImageType, ImagerySource, Release};
use crate::repo;
use crate::repo::imagery::NewImagery;
use crate::services::clients::types::{ArtImage, ArtworkLookup};

use super::SongEnricher;

/// Poll every unchecked release reachable from a song. Returns the number
/// of releases processed.
pub async fn poll_song_releases(enricher: &SongEnricher, song_id: Uuid) -> Result<usize> {
    let releases = {
        let mut conn = enricher.pool().acquire().await?;
        repo::releases::unchecked_releases_for_song(&mut *conn, song_id, 500).await?
    };

    poll_releases(enricher, &releases).await
}

/// Backfill pass: poll unchecked releases store-wide, oldest first.
pub async fn poll_unchecked_releases(enricher: &SongEnricher, limit: i64) -> Result<usize> {
    let releases = {
        let mut conn = enricher.pool().acquire().await?;
        repo::releases::unchecked_releases(&mut *conn, limit).await?
    };

    poll_releases(enricher, &releases).await
}

async fn poll_releases(enricher: &SongEnricher, releases: &[Release]) -> Result<usize> {
    let mut processed = 0usize;

    for release in releases {
        let Some(mbid) = release.musicbrainz_release_id.as_deref() else {
            continue;
        };

        let lookup = enricher.caa.release_artwork(mbid).await?;

        let mut tx = enricher.pool().begin().await?;
        match lookup {
            ArtworkLookup::Found(images) => {
                let kept = first_per_type(&images);
                tracing::info!(
                    "Storing {} cover image(s) for '{}'",
                    kept.len(),
                    release.title
                );
                for image in kept {
                    repo::imagery::upsert_release_imagery(
                        &mut *tx,
                        &NewImagery {
                            release_id: release.id,
                            source: ImagerySource::CoverArtArchive,
                            image_type: image.image_type,
                            small_url: image.small_url.as_deref(),
                            medium_url: image.medium_url.as_deref(),
                            large_url: image.large_url.as_deref(),
                            source_id: image.source_id.as_deref(),
                            source_url: image.source_url.as_deref(),
                            checksum: None,
                            approved: true,
                        },
                    )
                    .await?;
                }
                repo::releases::mark_release_checked(&mut *tx, release.id).await?;
            }
            ArtworkLookup::NoArtwork => {
                tracing::debug!("No cover art for '{}'", release.title);
                repo::releases::mark_release_checked(&mut *tx, release.id).await?;
            }
            ArtworkLookup::ReleaseUnknown => {
                tracing::debug!(
                    "Art archive does not know release '{}'; leaving unchecked",
                    release.title
                );
                tx.rollback().await.ok();
                continue;
            }
        }
        tx.commit()
            .await
            .context("Failed to commit cover art for release")?;
        processed += 1;
    }

    Ok(processed)
}

/// Keep the first image of each type; later duplicates of the same type in
/// one payload are ignored.
fn first_per_type(images: &[ArtImage]) -> Vec<&ArtImage> {
    let mut seen: HashSet<ImageType> = HashSet::new();
    images
        .iter()
        .filter(|img| seen.insert(img.image_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(image_type: ImageType, id: &str) -> ArtImage {
        ArtImage {
            image_type,
            small_url: None,
            medium_url: None,
            large_url: None,
            source_id: Some(id.to_string()),
            source_url: None,
        }
    }

    #[test]
    fn first_image_per_type_wins() {
        let images = vec![
            image(ImageType::Front, "front-1"),
            image(ImageType::Front, "front-2"),
            image(ImageType::Back, "back-1"),
            image(ImageType::Back, "back-2"),
        ];

        let kept = first_per_type(&images);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source_id.as_deref(), Some("front-1"));
        assert_eq!(kept[1].source_id.as_deref(), Some("back-1"));
    }
}
