//! Streaming-link upserts with manual-override protection.
//!
//! Rows with `match_method = 'manual'` were curated by a human. The pipeline
//! refuses to touch them twice over: callers check `*_link_is_manual` before
//! writing, and every conflict update carries a
//! `WHERE match_method <> 'manual'` guard as the backstop.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{
    MatchMethod, RecordingReleaseStreamingLink, ReleaseStreamingLink, StreamingService,
};

pub async fn release_link_is_manual(
    conn: &mut PgConnection,
    release_id: Uuid,
    service: StreamingService,
) -> Result<bool> {
    let method: Option<(MatchMethod,)> = sqlx::query_as(
        "SELECT match_method FROM release_streaming_links WHERE release_id = $1 AND service = $2",
    )
    .bind(release_id)
    .bind(service)
    .fetch_optional(conn)
    .await
    .context("Failed to check release link override")?;

    Ok(matches!(method, Some((MatchMethod::Manual,))))
}

pub async fn track_link_is_manual(
    conn: &mut PgConnection,
    recording_release_id: Uuid,
    service: StreamingService,
) -> Result<bool> {
    let method: Option<(MatchMethod,)> = sqlx::query_as(
        r#"
        SELECT match_method FROM recording_release_streaming_links
        WHERE recording_release_id = $1 AND service = $2
        "#,
    )
    .bind(recording_release_id)
    .bind(service)
    .fetch_optional(conn)
    .await
    .context("Failed to check track link override")?;

    Ok(matches!(method, Some((MatchMethod::Manual,))))
}

/// Upsert an album-level link. Returns None when the write was skipped
/// because the existing row is a manual override.
pub async fn upsert_release_streaming_link(
    conn: &mut PgConnection,
    release_id: Uuid,
    service: StreamingService,
    service_id: &str,
    service_url: &str,
    match_method: MatchMethod,
) -> Result<Option<ReleaseStreamingLink>> {
    sqlx::query_as::<_, ReleaseStreamingLink>(
        r#"
        INSERT INTO release_streaming_links (
            release_id, service, service_id, service_url, match_method, matched_at
        )
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (release_id, service) DO UPDATE SET
            service_id = EXCLUDED.service_id,
            service_url = EXCLUDED.service_url,
            match_method = EXCLUDED.match_method,
            matched_at = EXCLUDED.matched_at,
            updated_at = NOW()
        WHERE release_streaming_links.match_method != 'manual'
        RETURNING *
        "#,
    )
    .bind(release_id)
    .bind(service)
    .bind(service_id)
    .bind(service_url)
    .bind(match_method)
    .fetch_optional(conn)
    .await
    .context("Failed to upsert release streaming link")
}

/// Upsert a track-level link, same override contract as the album level.
pub async fn upsert_track_streaming_link(
    conn: &mut PgConnection,
    recording_release_id: Uuid,
    service: StreamingService,
    service_id: &str,
    service_url: &str,
    match_method: MatchMethod,
) -> Result<Option<RecordingReleaseStreamingLink>> {
    sqlx::query_as::<_, RecordingReleaseStreamingLink>(
        r#"
        INSERT INTO recording_release_streaming_links (
            recording_release_id, service, service_id, service_url, match_method, matched_at
        )
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (recording_release_id, service) DO UPDATE SET
            service_id = EXCLUDED.service_id,
            service_url = EXCLUDED.service_url,
            match_method = EXCLUDED.match_method,
            matched_at = EXCLUDED.matched_at,
            updated_at = NOW()
        WHERE recording_release_streaming_links.match_method != 'manual'
        RETURNING *
        "#,
    )
    .bind(recording_release_id)
    .bind(service)
    .bind(service_id)
    .bind(service_url)
    .bind(match_method)
    .fetch_optional(conn)
    .await
    .context("Failed to upsert track streaming link")
}

/// Non-manual album links for a song's releases, for the repair pass.
pub async fn repairable_release_links_for_song(
    conn: &mut PgConnection,
    song_id: Uuid,
    service: StreamingService,
) -> Result<Vec<ReleaseStreamingLink>> {
    sqlx::query_as::<_, ReleaseStreamingLink>(
        r#"
        SELECT DISTINCT rsl.*
        FROM release_streaming_links rsl
        JOIN recording_releases rr ON rr.release_id = rsl.release_id
        JOIN recordings rec ON rec.id = rr.recording_id
        WHERE rec.song_id = $1
          AND rsl.service = $2
          AND rsl.match_method != 'manual'
        "#,
    )
    .bind(song_id)
    .bind(service)
    .fetch_all(conn)
    .await
    .context("Failed to list repairable links")
}
