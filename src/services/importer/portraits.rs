//! Performer portrait pass.
//!
//! For performers on a song's recordings that have no portrait yet, pull the
//! lead image from the editorial image archive, verify the source article
//! actually describes the musician, and persist the licensed image. A failed
//! verification means nothing is persisted.

use anyhow::Result;

use crate::models::{ImageLicense, Performer, Song};
use crate::repo;
use crate::repo::images::NewImage;
use crate::services::clients::WikimediaClient;
use crate::services::verifier::{ReferenceVerifier, VerificationContext};

use sqlx::PgPool;

/// Counters for one portrait pass.
#[derive(Debug, Clone, Default)]
pub struct PortraitStats {
    pub checked: usize,
    pub stored: usize,
    pub rejected: usize,
    pub missing: usize,
}

/// Portrait fetcher; owns its own archive client and verifier.
pub struct PortraitFetcher {
    pool: PgPool,
    wiki: WikimediaClient,
    verifier: ReferenceVerifier,
    dry_run: bool,
}

impl PortraitFetcher {
    pub fn new(
        pool: PgPool,
        wiki: WikimediaClient,
        verifier: ReferenceVerifier,
        dry_run: bool,
    ) -> Self {
        Self {
            pool,
            wiki,
            verifier,
            dry_run,
        }
    }

    /// Fetch portraits for every performer on the song without one.
    pub async fn fetch_song_portraits(&self, song: &Song) -> Result<PortraitStats> {
        let mut stats = PortraitStats::default();

        let performers = {
            let mut conn = self.pool.acquire().await?;
            repo::performers::performers_for_song(&mut *conn, song.id).await?
        };

        for performer in &performers {
            {
                let mut conn = self.pool.acquire().await?;
                if repo::images::performer_has_portrait(&mut *conn, performer.id).await? {
                    continue;
                }
            }

            stats.checked += 1;
            match self.fetch_one(song, performer).await? {
                PortraitOutcome::Stored => stats.stored += 1,
                PortraitOutcome::Rejected => stats.rejected += 1,
                PortraitOutcome::Missing => stats.missing += 1,
            }
        }

        tracing::info!(
            "Portrait pass for '{}': {} checked, {} stored, {} rejected, {} without image",
            song.title,
            stats.checked,
            stats.stored,
            stats.rejected,
            stats.missing
        );
        Ok(stats)
    }

    async fn fetch_one(&self, song: &Song, performer: &Performer) -> Result<PortraitOutcome> {
        let Some(info) = self.wiki.portrait(&performer.name, None).await? else {
            return Ok(PortraitOutcome::Missing);
        };

        // The portrait is only as trustworthy as the article it came from.
        if let Some(page_url) = info.source_page_url.as_deref() {
            let context = VerificationContext {
                birth_date: performer.birth_date,
                death_date: performer.death_date,
                sample_titles: vec![song.title.clone()],
            };
            let verdict = self.verifier.verify(&performer.name, page_url, &context).await?;
            if !verdict.valid {
                tracing::warn!(
                    "Rejecting portrait for {}: {} ({})",
                    performer.name,
                    verdict.reason,
                    verdict.confidence
                );
                return Ok(PortraitOutcome::Rejected);
            }
        }

        if self.dry_run {
            tracing::info!(
                "[DRY RUN] Would store portrait for {}: {}",
                performer.name,
                info.url
            );
            return Ok(PortraitOutcome::Stored);
        }

        let license = info
            .license_raw
            .as_deref()
            .map(ImageLicense::normalize)
            .unwrap_or(ImageLicense::Unknown);

        let mut tx = self.pool.begin().await?;
        let image = repo::images::upsert_image(
            &mut *tx,
            &NewImage {
                url: &info.url,
                caption: info.caption.as_deref(),
                license,
                license_details: info.license_raw.as_deref(),
                attribution: info.attribution.as_deref(),
                source_page_url: info.source_page_url.as_deref(),
                width: info.width,
                height: info.height,
            },
        )
        .await?;
        repo::images::link_artist_image(&mut *tx, performer.id, image.id, true).await?;
        tx.commit().await?;

        tracing::info!("Stored portrait for {} ({})", performer.name, license);
        Ok(PortraitOutcome::Stored)
    }
}

enum PortraitOutcome {
    Stored,
    Rejected,
    Missing,
}
