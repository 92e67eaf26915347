//! Streaming-link matching against the consumer services.
//!
//! Progressive search per release, scored with the loose streaming
//! threshold (edition suffixes are everywhere), written with
//! `match_method = fuzzy_search`. Manual rows are checked before writing and
//! guarded again by the upsert's WHERE clause. The repair pass re-resolves
//! non-manual links whose service id no longer exists, writing
//! `match_method = repair_script`.

use anyhow::Result;
use uuid::Uuid;

use crate::models::{MatchMethod, Release, Song, StreamingService};
use crate::repo;
use crate::services::clients::types::{AlbumHit, TrackHit};
use crate::services::clients::itunes::artwork_urls;
use crate::services::resolver::streaming_titles_match;

use super::SongEnricher;

/// Counters for one streaming pass.
#[derive(Debug, Clone, Default)]
pub struct StreamingStats {
    pub linked: usize,
    pub skipped_manual: usize,
    pub unmatched: usize,
}

/// Counters for one repair pass.
#[derive(Debug, Clone, Default)]
pub struct RepairStats {
    pub checked: usize,
    pub still_valid: usize,
    pub repaired: usize,
    pub unmatched: usize,
}

/// Does a service hit plausibly describe this release? Both the album title
/// and (when we know one) the artist credit must clear the loose threshold.
fn album_matches(release: &Release, hit_title: &str, hit_artist: &str) -> bool {
    if !streaming_titles_match(&release.title, hit_title) {
        return false;
    }
    match release.artist_credit.as_deref() {
        Some(credit) => streaming_titles_match(credit, hit_artist),
        None => true,
    }
}

/// Pick the best iTunes album hit for a release.
fn best_itunes_album<'a>(release: &Release, hits: &'a [AlbumHit]) -> Option<&'a AlbumHit> {
    hits.iter()
        .find(|hit| album_matches(release, &hit.title, &hit.artist_name))
}

/// Match and persist streaming links for every release of a song.
pub async fn match_song_links(enricher: &SongEnricher, song: &Song) -> Result<StreamingStats> {
    let mut stats = StreamingStats::default();

    let (releases, recordings) = {
        let mut conn = enricher.pool().acquire().await?;
        (
            repo::releases::releases_for_song(&mut *conn, song.id).await?,
            repo::recordings::recordings_for_song(&mut *conn, song.id).await?,
        )
    };

    for release in &releases {
        if enricher.spotify.is_some() {
            match_spotify_release(enricher, song, release, &recordings, &mut stats).await?;
        }
        match_itunes_release(enricher, song, release, &recordings, &mut stats).await?;
    }

    tracing::info!(
        "Streaming pass for '{}': {} linked, {} manual rows preserved, {} unmatched",
        song.title,
        stats.linked,
        stats.skipped_manual,
        stats.unmatched
    );
    Ok(stats)
}

async fn match_spotify_release(
    enricher: &SongEnricher,
    song: &Song,
    release: &Release,
    recordings: &[crate::models::Recording],
    stats: &mut StreamingStats,
) -> Result<()> {
    let spotify = enricher.spotify.as_ref().expect("caller checked");

    {
        let mut conn = enricher.pool().acquire().await?;
        if repo::streaming::release_link_is_manual(&mut *conn, release.id, StreamingService::Spotify)
            .await?
        {
            tracing::debug!("Manual Spotify link on '{}'; skipping", release.title);
            stats.skipped_manual += 1;
            return Ok(());
        }
    }

    let hit = spotify
        .search_track(
            &song.title,
            Some(&release.title),
            release.artist_credit.as_deref(),
            release.release_year,
        )
        .await?;

    let Some(hit) = hit else {
        stats.unmatched += 1;
        return Ok(());
    };

    let album_ok = hit
        .album_title
        .as_deref()
        .map(|album| album_matches(release, album, &hit.artist_name))
        .unwrap_or(false);
    if !album_ok {
        tracing::debug!(
            "Spotify hit '{}' rejected for release '{}'",
            hit.album_title.as_deref().unwrap_or("?"),
            release.title
        );
        stats.unmatched += 1;
        return Ok(());
    }

    let mut tx = enricher.pool().begin().await?;

    if let Some(album_id) = &hit.album_id {
        let album_url = format!("https://open.spotify.com/album/{}", album_id);
        let written = repo::streaming::upsert_release_streaming_link(
            &mut *tx,
            release.id,
            StreamingService::Spotify,
            album_id,
            &album_url,
            MatchMethod::FuzzySearch,
        )
        .await?;
        if written.is_some() {
            stats.linked += 1;
        } else {
            stats.skipped_manual += 1;
        }
    }

    link_tracks(
        &mut tx,
        release,
        recordings,
        StreamingService::Spotify,
        &hit,
        MatchMethod::FuzzySearch,
        stats,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn match_itunes_release(
    enricher: &SongEnricher,
    song: &Song,
    release: &Release,
    recordings: &[crate::models::Recording],
    stats: &mut StreamingStats,
) -> Result<()> {
    {
        let mut conn = enricher.pool().acquire().await?;
        if repo::streaming::release_link_is_manual(
            &mut *conn,
            release.id,
            StreamingService::AppleMusic,
        )
        .await?
        {
            tracing::debug!("Manual iTunes link on '{}'; skipping", release.title);
            stats.skipped_manual += 1;
            return Ok(());
        }
    }

    let artist_hint = release.artist_credit.clone().unwrap_or_default();
    let albums = enricher
        .itunes
        .search_albums(&artist_hint, Some(&release.title))
        .await?;

    let Some(album) = best_itunes_album(release, &albums) else {
        stats.unmatched += 1;
        return Ok(());
    };

    let mut tx = enricher.pool().begin().await?;

    let album_url = album
        .url
        .clone()
        .unwrap_or_else(|| format!("https://music.apple.com/album/{}", album.id));
    let written = repo::streaming::upsert_release_streaming_link(
        &mut *tx,
        release.id,
        StreamingService::AppleMusic,
        &album.id,
        &album_url,
        MatchMethod::FuzzySearch,
    )
    .await?;
    if written.is_some() {
        stats.linked += 1;
    } else {
        stats.skipped_manual += 1;
    }

    // The matched album also supplies consumer-service artwork, derived by
    // size substitution from the 100x100 URL.
    if let Some(artwork_100) = &album.artwork_url_100 {
        let urls = artwork_urls(artwork_100);
        repo::imagery::upsert_release_imagery(
            &mut *tx,
            &repo::imagery::NewImagery {
                release_id: release.id,
                source: crate::models::ImagerySource::Itunes,
                image_type: crate::models::ImageType::Front,
                small_url: Some(&urls.small),
                medium_url: Some(&urls.medium),
                large_url: Some(&urls.large),
                source_id: Some(&album.id),
                source_url: album.url.as_deref(),
                checksum: None,
                approved: true,
            },
        )
        .await?;
    }

    tx.commit().await?;

    // Track links come from a separate track search scoped by the song.
    let tracks = enricher.itunes.search_tracks(&artist_hint, &song.title).await?;
    let track_hit = tracks.iter().find(|t| {
        t.album_title
            .as_deref()
            .map(|album_title| streaming_titles_match(album_title, &release.title))
            .unwrap_or(false)
    });

    if let Some(track_hit) = track_hit {
        let mut tx = enricher.pool().begin().await?;
        link_tracks(
            &mut tx,
            release,
            recordings,
            StreamingService::AppleMusic,
            track_hit,
            MatchMethod::FuzzySearch,
            stats,
        )
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// Write track-level links for every recording of the song that appears on
/// this release.
async fn link_tracks(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    release: &Release,
    recordings: &[crate::models::Recording],
    service: StreamingService,
    hit: &TrackHit,
    method: MatchMethod,
    stats: &mut StreamingStats,
) -> Result<()> {
    let Some(url) = hit.url.as_deref() else {
        return Ok(());
    };

    for recording in recordings {
        let Some(link) =
            repo::links::find_recording_release(&mut **tx, recording.id, release.id).await?
        else {
            continue;
        };

        if repo::streaming::track_link_is_manual(&mut **tx, link.id, service).await? {
            stats.skipped_manual += 1;
            continue;
        }

        let written = repo::streaming::upsert_track_streaming_link(
            &mut **tx,
            link.id,
            service,
            &hit.id,
            url,
            method,
        )
        .await?;
        if written.is_some() {
            stats.linked += 1;
        }
    }

    Ok(())
}

/// Repair pass: confirm that non-manual links still resolve at the service;
/// dead ids are re-matched and rewritten as `repair_script`.
pub async fn repair_song_links(enricher: &SongEnricher, song: &Song) -> Result<RepairStats> {
    let mut stats = RepairStats::default();

    if enricher.spotify.is_some() {
        repair_service(enricher, song, StreamingService::Spotify, &mut stats).await?;
    }
    repair_service(enricher, song, StreamingService::AppleMusic, &mut stats).await?;

    tracing::info!(
        "Repair pass for '{}': {} checked, {} valid, {} repaired, {} unmatched",
        song.title,
        stats.checked,
        stats.still_valid,
        stats.repaired,
        stats.unmatched
    );
    Ok(stats)
}

async fn repair_service(
    enricher: &SongEnricher,
    song: &Song,
    service: StreamingService,
    stats: &mut RepairStats,
) -> Result<()> {
    let links = {
        let mut conn = enricher.pool().acquire().await?;
        repo::streaming::repairable_release_links_for_song(&mut *conn, song.id, service).await?
    };

    for link in links {
        stats.checked += 1;

        let resolves = match service {
            StreamingService::Spotify => {
                let spotify = enricher.spotify.as_ref().expect("caller checked");
                spotify.album_detail(&link.service_id).await?.is_some()
            }
            StreamingService::AppleMusic => {
                enricher.itunes.lookup_album(&link.service_id).await?.is_some()
            }
        };

        if resolves {
            stats.still_valid += 1;
            continue;
        }

        tracing::warn!(
            "{} id {} no longer resolves; re-matching release",
            service,
            link.service_id
        );

        if repair_release_link(enricher, song, link.release_id, service).await? {
            stats.repaired += 1;
        } else {
            stats.unmatched += 1;
        }
    }

    Ok(())
}

async fn repair_release_link(
    enricher: &SongEnricher,
    song: &Song,
    release_id: Uuid,
    service: StreamingService,
) -> Result<bool> {
    let release = {
        let mut conn = enricher.pool().acquire().await?;
        repo::releases::find_release_by_id(&mut *conn, release_id).await?
    };
    let Some(release) = release else {
        return Ok(false);
    };

    let replacement: Option<(String, String)> = match service {
        StreamingService::Spotify => {
            let spotify = enricher.spotify.as_ref().expect("caller checked");
            let hit = spotify
                .search_track(
                    &song.title,
                    Some(&release.title),
                    release.artist_credit.as_deref(),
                    release.release_year,
                )
                .await?;
            hit.and_then(|h| {
                let ok = h
                    .album_title
                    .as_deref()
                    .map(|album| album_matches(&release, album, &h.artist_name))
                    .unwrap_or(false);
                if !ok {
                    return None;
                }
                let id = h.album_id?;
                let url = format!("https://open.spotify.com/album/{}", id);
                Some((id, url))
            })
        }
        StreamingService::AppleMusic => {
            let artist_hint = release.artist_credit.clone().unwrap_or_default();
            let albums = enricher
                .itunes
                .search_albums(&artist_hint, Some(&release.title))
                .await?;
            best_itunes_album(&release, &albums).map(|album| {
                let url = album
                    .url
                    .clone()
                    .unwrap_or_else(|| format!("https://music.apple.com/album/{}", album.id));
                (album.id.clone(), url)
            })
        }
    };

    let Some((service_id, service_url)) = replacement else {
        return Ok(false);
    };

    let mut tx = enricher.pool().begin().await?;
    let written = repo::streaming::upsert_release_streaming_link(
        &mut *tx,
        release.id,
        service,
        &service_id,
        &service_url,
        MatchMethod::RepairScript,
    )
    .await?;
    tx.commit().await?;

    Ok(written.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn release(title: &str, artist: Option<&str>) -> Release {
        Release {
            id: Uuid::new_v4(),
            title: title.to_string(),
            artist_credit: artist.map(String::from),
            release_year: Some(1959),
            musicbrainz_release_id: Some("mb-rel".to_string()),
            cover_art_checked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn album(title: &str, artist: &str) -> AlbumHit {
        AlbumHit {
            id: "123".to_string(),
            title: title.to_string(),
            artist_name: artist.to_string(),
            year: Some(1959),
            url: None,
            artwork_url_100: None,
        }
    }

    #[test]
    fn edition_suffix_still_matches() {
        let release = release("Kind of Blue", Some("Miles Davis"));
        assert!(album_matches(
            &release,
            "Kind of Blue (Legacy Edition)",
            "Miles Davis"
        ));
    }

    #[test]
    fn wrong_album_or_artist_is_rejected() {
        let release = release("Kind of Blue", Some("Miles Davis"));
        assert!(!album_matches(&release, "Blue Train", "John Coltrane"));
        assert!(!album_matches(&release, "Kind of Blue", "A Completely Different Orchestra"));
    }

    #[test]
    fn release_without_artist_credit_matches_on_title_alone() {
        let release = release("Time Out", None);
        assert!(album_matches(&release, "Time Out", "Anyone"));
    }

    #[test]
    fn best_album_prefers_first_acceptable_hit() {
        let release = release("Time Out", Some("The Dave Brubeck Quartet"));
        let hits = vec![
            album("Completely Unrelated", "Someone Else"),
            album("Time Out", "Dave Brubeck Quartet"),
            album("Time Out (50th Anniversary)", "The Dave Brubeck Quartet"),
        ];

        let best = best_itunes_album(&release, &hits).unwrap();
        assert_eq!(best.title, "Time Out");
    }
}
