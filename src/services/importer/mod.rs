//! Importer / reconciler
//!
//! Orchestrates enrichment for one seed song: resolve the song row, resolve
//! its encyclopedia work id, walk the work's recordings, and write releases,
//! performers, instruments, links, imagery, and streaming links through the
//! data access layer. Each recording commits in its own transaction; a
//! failure rolls that recording back and the seed moves on.

pub mod cover_art;
pub mod portraits;
pub mod streaming;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{PipelineError, ProviderError};
use crate::models::song::SongPatch;
use crate::models::{PerformerRole, Song};
use crate::repo;
use crate::services::clients::types::parse_full_date;
use crate::services::clients::{
    ArtistCreditRef, ArtistRel, CoverArtClient, ItunesClient, JazzStandardsClient,
    MusicBrainzClient, RecordingRef, SpotifyClient,
};
use crate::services::resolver::{
    is_group_leader, score_artist_candidate, MatchKind, AUTO_MATCH_THRESHOLD,
};

/// Relation types that are technical credits, never performance roles.
const TECHNICAL_RELATION_TYPES: [&str; 4] = ["engineer", "producer", "mix", "mastering"];

/// Identifies the seed of an enrichment run.
#[derive(Debug, Clone)]
pub enum SongSeed {
    Title(String),
    Id(Uuid),
}

/// Importer tuning.
#[derive(Debug, Clone)]
pub struct ImporterOptions {
    /// Maximum recordings imported per seed.
    pub limit: usize,
    /// Read-only preview: fetches happen, writes do not.
    pub dry_run: bool,
    /// Run the streaming-link pass after the import.
    pub match_streaming: bool,
}

impl Default for ImporterOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            dry_run: false,
            match_streaming: false,
        }
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStats {
    pub found: usize,
    pub imported: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Seed-level result: always structured, even on partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub success: bool,
    pub song_id: Option<Uuid>,
    pub song_title: Option<String>,
    pub stats: ImportStats,
    pub errors: Vec<String>,
}

impl ImportSummary {
    fn empty() -> Self {
        Self {
            success: false,
            song_id: None,
            song_title: None,
            stats: ImportStats::default(),
            errors: Vec::new(),
        }
    }
}

enum RecordingOutcome {
    Imported,
    SkippedExisting,
}

/// One planned recording_performers write: a performer, the instruments they
/// played, and the role they get.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformerAssignment {
    pub name: String,
    pub mbid: Option<String>,
    pub sort_name: Option<String>,
    pub instruments: Vec<String>,
    pub role: PerformerRole,
}

/// The enrichment engine. Owns one client set; not shareable across
/// concurrent seeds.
pub struct SongEnricher {
    pool: PgPool,
    pub(crate) mb: MusicBrainzClient,
    pub(crate) caa: CoverArtClient,
    pub(crate) itunes: ItunesClient,
    pub(crate) spotify: Option<SpotifyClient>,
    editorial: JazzStandardsClient,
    options: ImporterOptions,
}

impl SongEnricher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        mb: MusicBrainzClient,
        caa: CoverArtClient,
        itunes: ItunesClient,
        spotify: Option<SpotifyClient>,
        editorial: JazzStandardsClient,
        options: ImporterOptions,
    ) -> Self {
        Self {
            pool,
            mb,
            caa,
            itunes,
            spotify,
            editorial,
            options,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn options(&self) -> &ImporterOptions {
        &self.options
    }

    /// Enrich one seed. Per-recording failures are collected; only seed-wide
    /// conditions (unknown song, database loss, provider cooldown exhausted)
    /// abort.
    pub async fn enrich(&self, seed: &SongSeed) -> Result<ImportSummary, PipelineError> {
        let mut summary = ImportSummary::empty();

        let song = self.locate_song(seed).await?;
        summary.song_id = Some(song.id);
        summary.song_title = Some(song.title.clone());

        tracing::info!("Enriching '{}' ({})", song.title, song.id);

        // Resolve the encyclopedia work id, persisting a fresh match.
        let work_id = match &song.musicbrainz_work_id {
            Some(id) => id.clone(),
            None => {
                match self
                    .mb
                    .search_work(&song.title, song.composer.as_deref())
                    .await?
                {
                    Some(work) => {
                        tracing::info!("Resolved work id {} for '{}'", work.id, song.title);
                        if !self.options.dry_run {
                            let mut conn = self.pool.acquire().await?;
                            repo::songs::set_work_id(&mut *conn, song.id, &work.id).await?;
                        }
                        work.id
                    }
                    None => {
                        summary
                            .errors
                            .push(format!("No encyclopedia work found for '{}'", song.title));
                        return Ok(summary);
                    }
                }
            }
        };

        let recordings = self.mb.work_recordings(&work_id).await?;
        summary.stats.found = recordings.len();
        tracing::info!(
            "Found {} recordings for work {} (importing up to {})",
            recordings.len(),
            work_id,
            self.options.limit
        );

        for recording_ref in recordings.iter().take(self.options.limit) {
            if self.options.dry_run {
                if let Err(e) = self.preview_recording(&song, recording_ref).await {
                    summary.stats.errors += 1;
                    summary.errors.push(format!("{}: {:#}", recording_ref.id, e));
                }
                continue;
            }

            let mut tx = self.pool.begin().await?;
            match self.import_recording(&mut *tx, &song, recording_ref).await {
                Ok(outcome) => {
                    tx.commit().await?;
                    match outcome {
                        RecordingOutcome::Imported => summary.stats.imported += 1,
                        RecordingOutcome::SkippedExisting => summary.stats.skipped += 1,
                    }
                }
                Err(e) => {
                    tx.rollback().await.ok();

                    // A provider-wide cooldown that still failed means every
                    // later recording would fail the same way; abort the seed.
                    if let Some(ProviderError::RateLimited { .. }) =
                        e.downcast_ref::<ProviderError>()
                    {
                        return Err(PipelineError::Provider(
                            e.downcast::<ProviderError>().expect("checked variant"),
                        ));
                    }

                    tracing::warn!("Recording {} failed: {:#}", recording_ref.id, e);
                    summary.stats.errors += 1;
                    summary.errors.push(format!("{}: {:#}", recording_ref.id, e));
                }
            }
        }

        if !self.options.dry_run {
            match cover_art::poll_song_releases(self, song.id).await {
                Ok(updated) => summary.stats.updated += updated,
                Err(e) => {
                    summary.stats.errors += 1;
                    summary.errors.push(format!("cover art: {:#}", e));
                }
            }

            if self.options.match_streaming {
                match streaming::match_song_links(self, &song).await {
                    Ok(stats) => {
                        summary.stats.updated += stats.linked;
                        summary.stats.skipped += stats.skipped_manual;
                    }
                    Err(e) => {
                        summary.stats.errors += 1;
                        summary.errors.push(format!("streaming links: {:#}", e));
                    }
                }
            }
        }

        summary.success = true;
        Ok(summary)
    }

    /// Find the seed song; on a fresh title, create a stub enriched from the
    /// editorial site.
    async fn locate_song(&self, seed: &SongSeed) -> Result<Song, PipelineError> {
        let mut conn = self.pool.acquire().await?;

        match seed {
            SongSeed::Id(id) => repo::songs::find_song_by_id(&mut *conn, *id)
                .await?
                .ok_or_else(|| PipelineError::SongNotFound(id.to_string())),
            SongSeed::Title(title) => {
                if let Some(song) = repo::songs::find_song_by_title(&mut *conn, title).await? {
                    return Ok(song);
                }
                if self.options.dry_run {
                    return Err(PipelineError::SongNotFound(title.clone()));
                }

                tracing::info!("'{}' not in store; creating from editorial source", title);
                let page = self.editorial.song_page(title).await?;

                let mut patch = SongPatch::default();
                if let Some(page) = &page {
                    patch.composer = page.composer.clone();
                    patch.structure = page.description.clone();
                    patch.external_references =
                        Some(serde_json::json!({ "jazzstandards": page.url }));
                }

                let song = repo::songs::upsert_song(&mut *conn, title, &patch).await?;

                // Editorial recommendations become stub recordings so the
                // canonical discography exists even before the encyclopedia
                // pass fills it out. The billed artist is linked as leader,
                // resolved against the encyclopedia when the name scores an
                // unambiguous match.
                if let Some(page) = &page {
                    for rec in &page.recommended_recordings {
                        let recording = repo::recordings::upsert_recording(
                            &mut *conn,
                            song.id,
                            None,
                            Some(&rec.album),
                            rec.year,
                            None,
                        )
                        .await?;

                        let mbid = self.resolve_artist_mbid(&rec.artist).await;
                        let (performer, _) = repo::performers::get_or_create_performer(
                            &mut *conn,
                            &rec.artist,
                            mbid.as_deref(),
                            None,
                        )
                        .await?;

                        if !repo::links::performer_linked(&mut *conn, recording.id, performer.id)
                            .await?
                        {
                            repo::links::link_recording_performer(
                                &mut *conn,
                                recording.id,
                                performer.id,
                                None,
                                PerformerRole::Leader,
                            )
                            .await?;
                        }
                    }
                }

                Ok(song)
            }
        }
    }

    /// Resolve an artist name to an encyclopedia id. Only an unambiguous
    /// match (at or above the auto-import threshold) is accepted; failures
    /// degrade to an id-less performer row.
    async fn resolve_artist_mbid(&self, name: &str) -> Option<String> {
        let candidates = match self.mb.search_artists(name).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Artist search failed for '{}': {}", name, e);
                return None;
            }
        };

        candidates
            .iter()
            .map(|c| {
                let score = score_artist_candidate(
                    name,
                    &c.name,
                    crate::services::clients::types::parse_year(c.begin_date.as_deref()),
                    None,
                );
                (c, score)
            })
            .max_by_key(|(_, score)| *score)
            .filter(|(_, score)| *score >= AUTO_MATCH_THRESHOLD)
            .map(|(c, _)| c.id.clone())
    }

    /// Read-only preview of one recording import.
    async fn preview_recording(
        &self,
        song: &Song,
        recording_ref: &RecordingRef,
    ) -> anyhow::Result<()> {
        let Some(detail) = self.mb.recording_detail(&recording_ref.id).await? else {
            tracing::info!("[DRY RUN] {}: no longer present upstream", recording_ref.id);
            return Ok(());
        };

        let leaders = leader_credits(&detail.artist_credit, &detail.releases);
        let plan = build_performer_plan(&detail.relations, &leaders);

        tracing::info!(
            "[DRY RUN] '{}' ({}): {} releases, {} performer rows",
            detail.title,
            song.title,
            detail.releases.len(),
            plan.len()
        );
        for assignment in &plan {
            let instruments = if assignment.instruments.is_empty() {
                "no instrument".to_string()
            } else {
                assignment.instruments.join(", ")
            };
            tracing::info!(
                "[DRY RUN]   - {} ({} - {})",
                assignment.name,
                assignment.role,
                instruments
            );
        }
        Ok(())
    }

    /// Import one recording inside the caller's transaction.
    async fn import_recording(
        &self,
        conn: &mut PgConnection,
        song: &Song,
        recording_ref: &RecordingRef,
    ) -> anyhow::Result<RecordingOutcome> {
        let Some(detail) = self.mb.recording_detail(&recording_ref.id).await? else {
            tracing::debug!("Recording {} vanished upstream, skipping", recording_ref.id);
            return Ok(RecordingOutcome::SkippedExisting);
        };

        let preexisting = repo::recordings::find_by_musicbrainz_id(conn, &detail.id)
            .await?
            .is_some();

        let album_title = detail.releases.first().map(|r| r.title.clone());
        let recording = repo::recordings::upsert_recording(
            conn,
            song.id,
            Some(&detail.id),
            album_title.as_deref(),
            detail.recording_year(),
            parse_full_date(detail.first_release_date.as_deref()),
        )
        .await?;

        // Releases first; link rows carry track position when known.
        let mut first_release_id = None;
        for release_ref in &detail.releases {
            let release = repo::releases::upsert_release(
                conn,
                &release_ref.id,
                &release_ref.title,
                release_ref
                    .artist_credit
                    .first()
                    .map(|c| c.name.as_str())
                    .or(detail.artist_credit.first().map(|c| c.name.as_str())),
                release_ref.release_year(),
            )
            .await?;

            let position = release_ref.track_position.as_ref();
            repo::links::link_recording_release(
                conn,
                recording.id,
                release.id,
                position.and_then(|p| p.disc_number),
                position.and_then(|p| p.track_number),
                position.and_then(|p| p.track_title.as_deref()),
            )
            .await?;

            first_release_id.get_or_insert(release.id);
        }

        // Artist relations, falling back to release detail when the
        // recording payload has none.
        let mut relations = detail.relations.clone();
        if relations.is_empty() {
            if let Some(first) = detail.releases.first() {
                tracing::debug!(
                    "No performer relations on recording {}, checking release {}",
                    detail.id,
                    first.id
                );
                if let Some(release_detail) = self.mb.release_detail(&first.id).await? {
                    relations = release_detail.relations;
                }
            }
        }

        let leaders = leader_credits(&detail.artist_credit, &detail.releases);
        let plan = build_performer_plan(&relations, &leaders);

        for assignment in &plan {
            let (performer, matched) = repo::performers::get_or_create_performer(
                conn,
                &assignment.name,
                assignment.mbid.as_deref(),
                assignment.sort_name.as_deref(),
            )
            .await?;

            // Fill in profile details for rows we just minted.
            if matched == MatchKind::Created {
                if let Some(mbid) = assignment.mbid.as_deref() {
                    if let Some(artist_detail) = self.mb.artist_detail(mbid).await? {
                        repo::performers::update_performer_profile(conn, performer.id, &artist_detail)
                            .await?;
                    }
                }
            }

            if repo::links::performer_linked(conn, recording.id, performer.id).await? {
                tracing::debug!("{} already linked to this recording", performer.name);
                continue;
            }

            if assignment.instruments.is_empty() {
                repo::links::link_recording_performer(
                    conn,
                    recording.id,
                    performer.id,
                    None,
                    assignment.role,
                )
                .await?;
            } else {
                for instrument_name in &assignment.instruments {
                    let instrument =
                        repo::instruments::get_or_create_instrument(conn, instrument_name).await?;
                    repo::links::link_recording_performer(
                        conn,
                        recording.id,
                        performer.id,
                        Some(instrument.id),
                        assignment.role,
                    )
                    .await?;
                }
            }
        }

        // Leader guarantee: a recording with performers must bill someone.
        if repo::links::performer_link_count(conn, recording.id).await? > 0
            && repo::links::leader_count(conn, recording.id).await? == 0
        {
            tracing::warn!(
                "No leader assigned on recording {}; promoting first performer",
                recording.id
            );
            repo::links::promote_first_leader(conn, recording.id).await?;
        }

        if recording.default_release_id.is_none() {
            if let Some(release_id) = first_release_id {
                repo::recordings::set_default_release(conn, recording.id, release_id).await?;
            }
        }

        Ok(if preexisting {
            RecordingOutcome::SkippedExisting
        } else {
            RecordingOutcome::Imported
        })
    }
}

/// The billed artists for a recording: its artist credit, falling back to
/// the first release's credit when the recording has none.
pub fn leader_credits(
    artist_credit: &[ArtistCreditRef],
    releases: &[crate::services::clients::ReleaseRef],
) -> Vec<ArtistCreditRef> {
    if !artist_credit.is_empty() {
        return artist_credit.to_vec();
    }
    releases
        .first()
        .map(|r| r.artist_credit.clone())
        .unwrap_or_default()
}

fn is_technical(relation_type: &str) -> bool {
    TECHNICAL_RELATION_TYPES.contains(&relation_type)
}

/// Classify one performer against the leader set.
pub fn assign_role(
    technical: bool,
    mbid: Option<&str>,
    name: &str,
    leaders: &[ArtistCreditRef],
) -> PerformerRole {
    if technical {
        return PerformerRole::Other;
    }

    let leader_ids: HashSet<&str> = leaders.iter().filter_map(|c| c.artist_id.as_deref()).collect();
    if let Some(mbid) = mbid {
        if leader_ids.contains(mbid) {
            return PerformerRole::Leader;
        }
    }

    let name_lower = name.to_lowercase();
    for credit in leaders {
        if credit.name.to_lowercase() == name_lower {
            return PerformerRole::Leader;
        }
        if is_group_leader(name, &credit.name) {
            return PerformerRole::Leader;
        }
    }

    PerformerRole::Sideman
}

/// Merge artist relations into one assignment per performer, instruments
/// collected from relation attributes, role from the leader rule. With no
/// relations at all, the credits themselves become instrument-less rows.
pub fn build_performer_plan(
    relations: &[ArtistRel],
    leaders: &[ArtistCreditRef],
) -> Vec<PerformerAssignment> {
    if relations.is_empty() {
        return leaders
            .iter()
            .map(|credit| PerformerAssignment {
                name: credit.name.clone(),
                mbid: credit.artist_id.clone(),
                sort_name: None,
                instruments: Vec::new(),
                role: assign_role(false, credit.artist_id.as_deref(), &credit.name, leaders),
            })
            .collect();
    }

    struct Slot {
        name: String,
        mbid: Option<String>,
        sort_name: Option<String>,
        instruments: Vec<String>,
        all_technical: bool,
    }

    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, Slot> = HashMap::new();

    for rel in relations {
        let name = rel.artist_name.clone().unwrap_or_default();
        if name.is_empty() && rel.artist_id.is_none() {
            continue;
        }
        let key = rel
            .artist_id
            .clone()
            .unwrap_or_else(|| format!("name:{}", name.to_lowercase()));

        let slot = slots.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Slot {
                name: name.clone(),
                mbid: rel.artist_id.clone(),
                sort_name: rel.artist_sort_name.clone(),
                instruments: Vec::new(),
                all_technical: true,
            }
        });

        if !is_technical(&rel.relation_type) {
            slot.all_technical = false;
        }
        for attribute in &rel.attributes {
            if !slot.instruments.contains(attribute) {
                slot.instruments.push(attribute.clone());
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| slots.remove(&key))
        .map(|slot| {
            let role = assign_role(slot.all_technical, slot.mbid.as_deref(), &slot.name, leaders);
            PerformerAssignment {
                name: slot.name,
                mbid: slot.mbid,
                sort_name: slot.sort_name,
                instruments: slot.instruments,
                role,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(name: &str, id: Option<&str>) -> ArtistCreditRef {
        ArtistCreditRef {
            name: name.to_string(),
            artist_id: id.map(String::from),
        }
    }

    fn rel(rel_type: &str, name: &str, id: &str, instruments: &[&str]) -> ArtistRel {
        ArtistRel {
            relation_type: rel_type.to_string(),
            artist_id: Some(id.to_string()),
            artist_name: Some(name.to_string()),
            artist_sort_name: None,
            attributes: instruments.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn group_leader_is_derived_from_trio_credit() {
        let leaders = vec![credit("Ahmad Jamal Trio", Some("group-1"))];
        let relations = vec![
            rel("instrument", "Ahmad Jamal", "a-1", &["piano"]),
            rel("instrument", "Israel Crosby", "a-2", &["double bass"]),
            rel("instrument", "Vernel Fournier", "a-3", &["drums"]),
        ];

        let plan = build_performer_plan(&relations, &leaders);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].name, "Ahmad Jamal");
        assert_eq!(plan[0].role, PerformerRole::Leader);
        assert_eq!(plan[1].role, PerformerRole::Sideman);
        assert_eq!(plan[2].role, PerformerRole::Sideman);
    }

    #[test]
    fn take_five_roles() {
        let leaders = vec![credit("The Dave Brubeck Quartet", Some("group-2"))];
        let relations = vec![
            rel("instrument", "Dave Brubeck", "a-10", &["piano"]),
            rel("instrument", "Paul Desmond", "a-11", &["alto saxophone"]),
            rel("instrument", "Eugene Wright", "a-12", &["double bass"]),
            rel("instrument", "Joe Morello", "a-13", &["drums"]),
            rel("producer", "Teo Macero", "a-14", &[]),
        ];

        let plan = build_performer_plan(&relations, &leaders);

        let brubeck = plan.iter().find(|p| p.name == "Dave Brubeck").unwrap();
        assert_eq!(brubeck.role, PerformerRole::Leader);

        let desmond = plan.iter().find(|p| p.name == "Paul Desmond").unwrap();
        assert_eq!(desmond.role, PerformerRole::Sideman);
        assert_eq!(desmond.instruments, vec!["alto saxophone"]);

        let macero = plan.iter().find(|p| p.name == "Teo Macero").unwrap();
        assert_eq!(macero.role, PerformerRole::Other);
        assert!(macero.instruments.is_empty());
    }

    #[test]
    fn technical_roles_beat_leader_membership() {
        // An artist credited as leader but appearing only as producer stays
        // a technical credit.
        let leaders = vec![credit("Quincy Jones", Some("a-20"))];
        let relations = vec![rel("producer", "Quincy Jones", "a-20", &[])];

        let plan = build_performer_plan(&relations, &leaders);
        assert_eq!(plan[0].role, PerformerRole::Other);
    }

    #[test]
    fn exact_id_match_marks_leader() {
        let leaders = vec![credit("Miles Davis", Some("a-30"))];
        let relations = vec![
            rel("instrument", "Miles Davis", "a-30", &["trumpet"]),
            rel("instrument", "John Coltrane", "a-31", &["tenor saxophone"]),
        ];

        let plan = build_performer_plan(&relations, &leaders);
        assert_eq!(plan[0].role, PerformerRole::Leader);
        assert_eq!(plan[1].role, PerformerRole::Sideman);
    }

    #[test]
    fn multi_instrument_relations_merge_into_one_assignment() {
        let leaders = vec![credit("Roland Kirk", Some("a-40"))];
        let relations = vec![
            rel("instrument", "Roland Kirk", "a-40", &["tenor saxophone"]),
            rel("instrument", "Roland Kirk", "a-40", &["manzello", "stritch"]),
        ];

        let plan = build_performer_plan(&relations, &leaders);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan[0].instruments,
            vec!["tenor saxophone", "manzello", "stritch"]
        );
    }

    #[test]
    fn credits_become_plan_when_no_relations_exist() {
        let leaders = vec![credit("Oscar Peterson", Some("a-50"))];
        let plan = build_performer_plan(&[], &leaders);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "Oscar Peterson");
        assert_eq!(plan[0].role, PerformerRole::Leader);
        assert!(plan[0].instruments.is_empty());
    }

    #[test]
    fn leader_credits_fall_back_to_first_release() {
        let releases = vec![crate::services::clients::ReleaseRef {
            id: "rel-1".to_string(),
            title: "Time Out".to_string(),
            date: Some("1959".to_string()),
            artist_credit: vec![credit("The Dave Brubeck Quartet", Some("g-1"))],
            track_position: None,
        }];

        let leaders = leader_credits(&[], &releases);
        assert_eq!(leaders.len(), 1);
        assert_eq!(leaders[0].name, "The Dave Brubeck Quartet");
    }
}
