//! Database schema migrations
//!
//! Versioned, idempotent schema changes tracked in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already ran them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Check before altering** - every migration must be safe to run twice
//! 4. **Use ALTER TABLE** - prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: uniqueness constraints the engine relies on
///
/// - at most one open (active or paused) session per (user, category)
/// - one ledger entry per (session, sequence)
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: tournament uniqueness indexes");

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_tournament_sessions_open
        ON tournament_sessions(user_id, category)
        WHERE status IN ('active', 'paused')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_tournament_choices_sequence
        ON tournament_choices(session_id, sequence)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration v2: server-observed latency on ledger entries
///
/// Complements the client-reported `response_time_ms` with the time between
/// the matchup being issued and the choice being recorded.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add observed_latency_ms column to tournament_choices");

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('tournament_choices') WHERE name = 'observed_latency_ms'",
    )
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  observed_latency_ms column already exists - skipping");
        return Ok(());
    }

    sqlx::query("ALTER TABLE tournament_choices ADD COLUMN observed_latency_ms INTEGER")
        .execute(pool)
        .await?;

    info!("  ✓ Added observed_latency_ms column to tournament_choices");
    Ok(())
}
