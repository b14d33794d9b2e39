//! Database initialization
//!
//! Creates the database on first run, applies per-connection pragmas,
//! creates tables idempotently, runs versioned migrations and writes
//! default settings. Safe to call on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Per-connection busy timeout; waits on the SQLite write lock before
/// surfacing `SQLITE_BUSY` to the retry layer
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Tables (idempotent)
    create_schema_version_table(&pool).await?;
    create_settings_table(&pool).await?;
    create_candidate_images_table(&pool).await?;
    create_tournament_sessions_table(&pool).await?;
    create_tournament_choices_table(&pool).await?;
    create_tournament_results_table(&pool).await?;
    create_catalog_stat_events_table(&pool).await?;

    // Versioned migrations run after CREATE TABLE IF NOT EXISTS
    crate::db::migrations::run_migrations(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Candidate images owned by the catalog
///
/// `win_rate`, `total_views` and `total_selections` are only written by the
/// catalog's outbox drain, never inside a tournament transaction.
async fn create_candidate_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candidate_images (
            guid TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            image_url TEXT NOT NULL,
            thumbnail_url TEXT NOT NULL,
            title TEXT,
            description TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            active INTEGER NOT NULL DEFAULT 1,
            win_rate REAL NOT NULL DEFAULT 0.0,
            total_views INTEGER NOT NULL DEFAULT 0,
            total_selections INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_candidate_images_category ON candidate_images(category, active)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per tournament run
///
/// `version` is the optimistic concurrency counter; every mutation is
/// `UPDATE ... WHERE guid = ? AND version = ?`.
async fn create_tournament_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tournament_sessions (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            category TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'paused', 'completed', 'abandoned')),
            tournament_size INTEGER NOT NULL CHECK (tournament_size >= 4 AND tournament_size <= 128),
            total_rounds INTEGER NOT NULL,
            current_round INTEGER NOT NULL DEFAULT 1,
            remaining_queue TEXT NOT NULL,
            eliminated_history TEXT NOT NULL DEFAULT '[]',
            current_matchup TEXT,
            matchup_started_at TIMESTAMP,
            version INTEGER NOT NULL DEFAULT 0,
            started_at TIMESTAMP NOT NULL,
            last_activity_at TIMESTAMP NOT NULL,
            completed_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tournament_sessions_user ON tournament_sessions(user_id, category, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only choice ledger
async fn create_tournament_choices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tournament_choices (
            guid TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES tournament_sessions(guid) ON DELETE CASCADE,
            sequence INTEGER NOT NULL,
            round_number INTEGER NOT NULL,
            option_a_id TEXT NOT NULL,
            option_b_id TEXT NOT NULL,
            winner_id TEXT NOT NULL,
            loser_id TEXT NOT NULL,
            response_time_ms INTEGER NOT NULL CHECK (response_time_ms >= 0),
            confidence_level INTEGER CHECK (confidence_level BETWEEN 1 AND 5),
            is_speed_bonus INTEGER NOT NULL DEFAULT 0,
            chosen_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Immutable tournament results, one per session
async fn create_tournament_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tournament_results (
            guid TEXT PRIMARY KEY,
            session_id TEXT NOT NULL UNIQUE REFERENCES tournament_sessions(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            category TEXT NOT NULL,
            champion_id TEXT NOT NULL,
            finalist_id TEXT,
            semifinalists TEXT NOT NULL DEFAULT '[]',
            elimination_order TEXT NOT NULL DEFAULT '[]',
            preference_strength REAL NOT NULL,
            consistency_score REAL NOT NULL,
            consistency_samples INTEGER NOT NULL DEFAULT 0,
            decision_speed_avg_ms REAL NOT NULL,
            dominant_preferences TEXT NOT NULL DEFAULT '[]',
            total_choices INTEGER NOT NULL,
            speed_bonus_count INTEGER NOT NULL,
            rounds_played INTEGER NOT NULL,
            tournament_size INTEGER NOT NULL,
            total_time_ms INTEGER NOT NULL,
            style_profile TEXT NOT NULL,
            completed_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tournament_results_user ON tournament_results(user_id, category, completed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Outbox of catalog statistic increments (views, selections)
async fn create_catalog_stat_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_stat_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('view', 'selection')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            applied_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_stat_events_pending ON catalog_stat_events(applied_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default runtime settings
///
/// Missing keys are created; NULL values are reset to the default.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "speed_bonus_threshold_ms", "3000").await?;
    ensure_setting(pool, "dominant_preferences_top_k", "5").await?;
    ensure_setting(pool, "db_lock_max_wait_ms", "2000").await?;
    ensure_setting(pool, "db_lock_max_attempts", "5").await?;
    ensure_setting(pool, "shuffle_candidates", "true").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent first-run initialization
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value.flatten())
}

/// Write a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
