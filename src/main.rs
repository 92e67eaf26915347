//! CLI entry points for the enrichment pipeline tasks.
//!
//! Each task takes a seed (`--name` or `--id`) plus the shared flags
//! (`--dry-run`, `--debug`, `--limit`, `--force-refresh`) and exits 0 on
//! success, 1 on failure.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use jazz_discography_pipeline::services::importer::{cover_art, streaming};
use jazz_discography_pipeline::{
    create_pool, AppConfig, CoverArtClient, FsCache, ImporterOptions, ItunesClient,
    JazzStandardsClient, MusicBrainzClient, PortraitFetcher, ReferenceVerifier, ResponseCache,
    SongEnricher, SongSeed, SpotifyClient, WikimediaClient,
};

#[derive(Parser)]
#[command(
    name = "jazz-discography-pipeline",
    about = "Jazz discography ingestion and enrichment tasks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct SeedArgs {
    /// Song title to work on
    #[arg(long, conflicts_with = "id")]
    name: Option<String>,

    /// Existing song id to work on
    #[arg(long)]
    id: Option<Uuid>,

    /// Preview without writing
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Maximum records to process
    #[arg(long)]
    limit: Option<usize>,

    /// Bypass cache reads (fresh data is still cached)
    #[arg(long)]
    force_refresh: bool,
}

impl SeedArgs {
    fn seed(&self) -> anyhow::Result<SongSeed> {
        match (&self.name, &self.id) {
            (Some(name), None) => Ok(SongSeed::Title(name.clone())),
            (None, Some(id)) => Ok(SongSeed::Id(*id)),
            _ => anyhow::bail!("exactly one of --name or --id is required"),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Enrich a song from the encyclopedia: recordings, releases,
    /// performers, instruments, and cover art
    Enrich {
        #[command(flatten)]
        seed: SeedArgs,

        /// Also match streaming links after the import
        #[arg(long)]
        streaming: bool,
    },

    /// Poll the cover art archive. With a seed, polls that song's unchecked
    /// releases; without one, backfills store-wide
    CoverArt {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Match a song's releases and tracks against the streaming services
    StreamingLinks {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Re-resolve streaming links whose service ids no longer exist
    RepairLinks {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Fetch and verify licensed performer portraits for a song
    Portraits {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Scrape the editorial site for a song and print the result
    Research {
        #[command(flatten)]
        seed: SeedArgs,
    },
}

impl Command {
    fn seed_args(&self) -> &SeedArgs {
        match self {
            Command::Enrich { seed, .. }
            | Command::CoverArt { seed }
            | Command::StreamingLinks { seed }
            | Command::RepairLinks { seed }
            | Command::Portraits { seed }
            | Command::Research { seed } => seed,
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "jazz_discography_pipeline=debug,info"
    } else {
        "jazz_discography_pipeline=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct ClientSet {
    mb: MusicBrainzClient,
    caa: CoverArtClient,
    itunes: ItunesClient,
    spotify: Option<SpotifyClient>,
    editorial: JazzStandardsClient,
}

fn build_clients(config: &AppConfig, force_refresh: bool) -> ClientSet {
    let cache_settings = config.cache.clone().with_force_refresh(force_refresh);

    let metadata_cache: Arc<dyn ResponseCache> = Arc::new(FsCache::new(
        cache_settings.root.clone(),
        cache_settings.metadata_ttl_days,
        cache_settings.force_refresh,
    ));
    let page_cache: Arc<dyn ResponseCache> = Arc::new(FsCache::new(
        cache_settings.root.clone(),
        cache_settings.page_ttl_days,
        cache_settings.force_refresh,
    ));

    let spotify = config
        .spotify
        .clone()
        .map(|credentials| SpotifyClient::new(credentials, metadata_cache.clone()));
    if spotify.is_none() {
        tracing::warn!("Spotify credentials not configured; Spotify matching disabled");
    }

    ClientSet {
        mb: MusicBrainzClient::new(metadata_cache.clone()),
        caa: CoverArtClient::new(metadata_cache.clone()),
        itunes: ItunesClient::new(metadata_cache),
        spotify,
        editorial: JazzStandardsClient::new(page_cache),
    }
}

fn page_cache(config: &AppConfig, force_refresh: bool) -> Arc<dyn ResponseCache> {
    let cache_settings = config.cache.clone().with_force_refresh(force_refresh);
    Arc::new(FsCache::new(
        cache_settings.root,
        cache_settings.page_ttl_days,
        cache_settings.force_refresh,
    ))
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let seed_args = cli.command.seed_args().clone();
    let config = AppConfig::from_env()?;

    // Research runs without a database at all.
    if let Command::Research { .. } = &cli.command {
        let clients = build_clients(&config, seed_args.force_refresh);
        let Some(name) = seed_args.name.as_deref() else {
            anyhow::bail!("research requires --name");
        };
        return match clients.editorial.song_page(name).await? {
            Some(page) => {
                println!("{}", serde_json::to_string_pretty(&page)?);
                Ok(true)
            }
            None => {
                tracing::warn!("No editorial page found for '{}'", name);
                Ok(false)
            }
        };
    }

    let pool = create_pool(&config.database).await?;
    jazz_discography_pipeline::health_check(&pool).await?;

    let clients = build_clients(&config, seed_args.force_refresh);
    let options = ImporterOptions {
        limit: seed_args.limit.unwrap_or(100),
        dry_run: seed_args.dry_run,
        match_streaming: matches!(&cli.command, Command::Enrich { streaming: true, .. }),
    };

    let enricher = SongEnricher::new(
        pool.clone(),
        clients.mb,
        clients.caa,
        clients.itunes,
        clients.spotify,
        clients.editorial,
        options,
    );

    match &cli.command {
        Command::Enrich { .. } => {
            let summary = enricher.enrich(&seed_args.seed()?).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(summary.success)
        }
        Command::CoverArt { .. } => {
            let processed = if seed_args.name.is_some() || seed_args.id.is_some() {
                let song = find_song(&pool, &seed_args).await?;
                cover_art::poll_song_releases(&enricher, song.id).await?
            } else {
                let limit = seed_args.limit.unwrap_or(500) as i64;
                cover_art::poll_unchecked_releases(&enricher, limit).await?
            };
            tracing::info!("Cover art pass processed {} release(s)", processed);
            Ok(true)
        }
        Command::StreamingLinks { .. } => {
            let song = find_song(&pool, &seed_args).await?;
            let stats = streaming::match_song_links(&enricher, &song).await?;
            println!(
                "linked: {}, manual preserved: {}, unmatched: {}",
                stats.linked, stats.skipped_manual, stats.unmatched
            );
            Ok(true)
        }
        Command::RepairLinks { .. } => {
            let song = find_song(&pool, &seed_args).await?;
            let stats = streaming::repair_song_links(&enricher, &song).await?;
            println!(
                "checked: {}, valid: {}, repaired: {}, unmatched: {}",
                stats.checked, stats.still_valid, stats.repaired, stats.unmatched
            );
            Ok(true)
        }
        Command::Portraits { .. } => {
            let song = find_song(&pool, &seed_args).await?;
            let wiki_cache = page_cache(&config, seed_args.force_refresh);
            let fetcher = PortraitFetcher::new(
                pool.clone(),
                WikimediaClient::new(wiki_cache.clone()),
                ReferenceVerifier::new(WikimediaClient::new(wiki_cache)),
                seed_args.dry_run,
            );
            let stats = fetcher.fetch_song_portraits(&song).await?;
            println!(
                "checked: {}, stored: {}, rejected: {}, missing: {}",
                stats.checked, stats.stored, stats.rejected, stats.missing
            );
            Ok(true)
        }
        Command::Research { .. } => unreachable!("handled above"),
    }
}

async fn find_song(
    pool: &sqlx::PgPool,
    seed_args: &SeedArgs,
) -> anyhow::Result<jazz_discography_pipeline::Song> {
    use jazz_discography_pipeline::repo::songs;

    let mut conn = pool.acquire().await?;
    let song = match seed_args.seed()? {
        SongSeed::Id(id) => songs::find_song_by_id(&mut *conn, id).await?,
        SongSeed::Title(title) => songs::find_song_by_title(&mut *conn, &title).await?,
    };
    song.ok_or_else(|| anyhow::anyhow!("song not found"))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.command.seed_args().debug);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("Task failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
