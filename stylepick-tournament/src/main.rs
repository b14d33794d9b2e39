//! stylepick-tournament - operator CLI for the tournament service
//!
//! Runs tournament operations against the local database and prints the
//! outcome as JSON on stdout. Logs go to stderr or the configured file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stylepick_common::config::{load_toml_config, resolve_root_folder, LoggingConfig};
use stylepick_common::db::{get_schema_version, init_database};
use stylepick_common::EventBus;
use stylepick_tournament::bracket::{Matchup, DEFAULT_TOURNAMENT_SIZE};
use stylepick_tournament::models::{ChoiceSubmission, ConfidenceLevel, NewCandidateImage};
use stylepick_tournament::{ImageCatalog, SqliteCatalog, TournamentService, TournamentSettings};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Command-line arguments for stylepick-tournament
#[derive(Parser, Debug)]
#[command(name = "stylepick-tournament")]
#[command(about = "Pairwise image tournaments for style preference discovery")]
#[command(version)]
struct Args {
    /// Folder holding the database (overrides env and config file)
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database
    Init,
    /// Add images from a JSON array of {category, image_url, ...}
    ImportImages { file: PathBuf },
    /// List categories and whether they can host a tournament
    Categories,
    /// Start a tournament
    Start {
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value_t = DEFAULT_TOURNAMENT_SIZE)]
        size: usize,
    },
    /// Show the user's open tournament in a category
    Active {
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: String,
    },
    /// Show a session
    Session { session_id: Uuid },
    /// Show the current matchup
    Matchup { session_id: Uuid },
    /// Pick the winner of the matchup shown as option A / option B
    Choose {
        session_id: Uuid,
        #[arg(long)]
        option_a: Uuid,
        #[arg(long)]
        option_b: Uuid,
        #[arg(long)]
        winner: Uuid,
        #[arg(long)]
        response_ms: u64,
        #[arg(long)]
        confidence: Option<u8>,
    },
    Pause { session_id: Uuid },
    Resume { session_id: Uuid },
    Abandon { session_id: Uuid },
    /// Complete a collapsed session (idempotent)
    Finalize { session_id: Uuid },
    /// Show a session's result
    Result { session_id: Uuid },
    /// Show a session's recorded choices
    Choices { session_id: Uuid },
    /// Page through a user's completed tournaments
    History {
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Latest style profile per category
    Profile {
        #[arg(long)]
        user: String,
    },
    /// Fold pending view/selection events into catalog counters
    ApplyStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_toml_config(args.config.as_deref()).context("Failed to load config")?;
    init_tracing(&config.logging)?;

    info!(
        "Starting StylePick tournament CLI v{}",
        env!("CARGO_PKG_VERSION")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = config.database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let settings = TournamentSettings::load(&pool).await?;
    let catalog = SqliteCatalog::new(pool.clone()).with_retry(settings.retry);
    let service = TournamentService::new(pool.clone(), catalog, settings, EventBus::new(100));

    match args.command {
        Command::Init => {
            let version = get_schema_version(&pool).await?;
            print_json(&serde_json::json!({
                "database": db_path,
                "schema_version": version,
            }))?;
        }
        Command::ImportImages { file } => {
            let images = read_images(&file)?;
            let mut added = Vec::with_capacity(images.len());
            for image in images {
                added.push(service.catalog().add_image(image).await?);
            }
            info!(count = added.len(), "Imported images");
            print_json(&added)?;
        }
        Command::Categories => print_json(&service.catalog().list_categories().await?)?,
        Command::Start {
            user,
            category,
            size,
        } => {
            let session = service.start(&user, &category, size).await?;
            print_json(&session.snapshot())?;
        }
        Command::Active { user, category } => {
            let session = service.get_active_session(&user, &category).await?;
            print_json(&session.map(|s| s.snapshot()))?;
        }
        Command::Session { session_id } => {
            print_json(&service.get_session(session_id).await?.snapshot())?
        }
        Command::Matchup { session_id } => {
            print_json(&service.get_current_matchup(session_id).await?)?
        }
        Command::Choose {
            session_id,
            option_a,
            option_b,
            winner,
            response_ms,
            confidence,
        } => {
            let submission = ChoiceSubmission {
                matchup: Matchup { option_a, option_b },
                winner_id: winner,
                response_time_ms: response_ms,
                confidence_level: confidence.map(ConfidenceLevel::new).transpose()?,
            };
            let session = service.submit_choice(session_id, submission).await?;
            print_json(&session.snapshot())?;
        }
        Command::Pause { session_id } => print_json(&service.pause(session_id).await?.snapshot())?,
        Command::Resume { session_id } => {
            print_json(&service.resume(session_id).await?.snapshot())?
        }
        Command::Abandon { session_id } => {
            print_json(&service.abandon(session_id).await?.snapshot())?
        }
        Command::Finalize { session_id } => print_json(&service.finalize(session_id).await?)?,
        Command::Result { session_id } => print_json(&service.get_result(session_id).await?)?,
        Command::Choices { session_id } => {
            print_json(&service.list_choices(session_id).await?)?
        }
        Command::History {
            user,
            category,
            limit,
            offset,
        } => {
            let page = service
                .history(&user, category.as_deref(), limit, offset)
                .await?;
            print_json(&page)?;
        }
        Command::Profile { user } => print_json(&service.user_style_profile(&user).await?)?,
        Command::ApplyStats => print_json(&service.catalog().apply_stat_events().await?)?,
    }

    pool.close().await;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn read_images(path: &Path) -> Result<Vec<NewCandidateImage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid image list in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
