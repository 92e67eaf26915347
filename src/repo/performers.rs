//! Performer reconciliation and upserts.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{ArtistType, Performer};
use crate::services::clients::ArtistDetail;
use crate::services::clients::types::parse_full_date;
use crate::services::resolver::MatchKind;

pub async fn find_by_musicbrainz_id(
    conn: &mut PgConnection,
    mbid: &str,
) -> Result<Option<Performer>> {
    sqlx::query_as::<_, Performer>("SELECT * FROM performers WHERE musicbrainz_artist_id = $1")
        .bind(mbid)
        .fetch_optional(conn)
        .await
        .context("Failed to query performer by external id")
}

pub async fn find_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Performer>> {
    sqlx::query_as::<_, Performer>(
        "SELECT * FROM performers WHERE LOWER(name) = LOWER($1) ORDER BY created_at LIMIT 1",
    )
    .bind(name)
    .fetch_optional(conn)
    .await
    .context("Failed to query performer by name")
}

/// Reconcile a performer against the store: external id first, then exact
/// name, then create. Returns the row plus how it was matched.
pub async fn get_or_create_performer(
    conn: &mut PgConnection,
    name: &str,
    mbid: Option<&str>,
    sort_name: Option<&str>,
) -> Result<(Performer, MatchKind)> {
    if let Some(mbid) = mbid {
        if let Some(performer) = find_by_musicbrainz_id(&mut *conn, mbid).await? {
            return Ok((performer, MatchKind::ExternalId));
        }
    }

    if let Some(performer) = find_by_name(&mut *conn, name).await? {
        // Attach the external id if this row was created without one.
        if let (Some(mbid), None) = (mbid, performer.musicbrainz_artist_id.as_deref()) {
            let updated = sqlx::query_as::<_, Performer>(
                r#"
                UPDATE performers
                SET musicbrainz_artist_id = $2, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(performer.id)
            .bind(mbid)
            .fetch_one(conn)
            .await
            .context("Failed to attach external id to performer")?;
            return Ok((updated, MatchKind::ExactName));
        }
        return Ok((performer, MatchKind::ExactName));
    }

    let created = sqlx::query_as::<_, Performer>(
        r#"
        INSERT INTO performers (name, sort_name, musicbrainz_artist_id, artist_type)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(sort_name)
    .bind(mbid)
    .bind(ArtistType::Other)
    .fetch_one(conn)
    .await
    .context("Failed to insert performer")?;

    tracing::info!("Created performer: {} ({})", created.name, created.id);
    Ok((created, MatchKind::Created))
}

/// Every performer appearing on a song's recordings.
pub async fn performers_for_song(
    conn: &mut PgConnection,
    song_id: Uuid,
) -> Result<Vec<Performer>> {
    sqlx::query_as::<_, Performer>(
        r#"
        SELECT DISTINCT p.*
        FROM performers p
        JOIN recording_performers rp ON rp.performer_id = p.id
        JOIN recordings rec ON rec.id = rp.recording_id
        WHERE rec.song_id = $1
        ORDER BY p.name
        "#,
    )
    .bind(song_id)
    .fetch_all(conn)
    .await
    .context("Failed to list performers for song")
}

/// Fill profile fields from encyclopedia artist detail, only where the row
/// has gaps.
pub async fn update_performer_profile(
    conn: &mut PgConnection,
    performer_id: Uuid,
    detail: &ArtistDetail,
) -> Result<Performer> {
    let artist_type = ArtistType::from_musicbrainz(detail.artist_type.as_deref());

    sqlx::query_as::<_, Performer>(
        r#"
        UPDATE performers
        SET sort_name = COALESCE(sort_name, $2),
            disambiguation = COALESCE(disambiguation, $3),
            birth_date = COALESCE(birth_date, $4),
            death_date = COALESCE(death_date, $5),
            artist_type = CASE WHEN artist_type = 'other' THEN $6 ELSE artist_type END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(performer_id)
    .bind(&detail.sort_name)
    .bind(&detail.disambiguation)
    .bind(parse_full_date(detail.begin_date.as_deref()))
    .bind(parse_full_date(detail.end_date.as_deref()))
    .bind(artist_type)
    .fetch_one(conn)
    .await
    .context("Failed to update performer profile")
}
