//! Runtime tournament settings
//!
//! Read from the `settings` table at startup. Values that are missing or
//! fail to parse fall back to their defaults with a warning; values outside
//! their valid range are clamped.

use sqlx::SqlitePool;
use std::str::FromStr;
use stylepick_common::db::init::get_setting;
use stylepick_common::db::RetryPolicy;
use stylepick_common::Result;
use tracing::warn;

/// Tunables consumed by the tournament service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TournamentSettings {
    /// Decisions faster than this count as speed-bonus choices
    pub speed_bonus_threshold_ms: u64,
    /// How many dominant preferences a result keeps
    pub dominant_top_k: usize,
    /// Budget for retrying transactions under lock contention
    pub retry: RetryPolicy,
    /// Shuffle fetched candidates before seeding the bracket
    pub shuffle_candidates: bool,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            speed_bonus_threshold_ms: 3000,
            dominant_top_k: 5,
            retry: RetryPolicy::default(),
            shuffle_candidates: true,
        }
    }
}

impl TournamentSettings {
    /// Load settings from the database
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();

        let speed_bonus_threshold_ms = load_or_default(
            pool,
            "speed_bonus_threshold_ms",
            defaults.speed_bonus_threshold_ms,
        )
        .await?
        .clamp(100, 60_000);

        let dominant_top_k =
            load_or_default(pool, "dominant_preferences_top_k", defaults.dominant_top_k)
                .await?
                .clamp(1, 64);

        let max_wait_ms = load_or_default(pool, "db_lock_max_wait_ms", defaults.retry.max_wait_ms)
            .await?
            .clamp(10, 30_000);

        let max_attempts =
            load_or_default(pool, "db_lock_max_attempts", defaults.retry.max_attempts)
                .await?
                .clamp(1, 50);

        let shuffle_candidates =
            load_or_default(pool, "shuffle_candidates", defaults.shuffle_candidates).await?;

        Ok(Self {
            speed_bonus_threshold_ms,
            dominant_top_k,
            retry: RetryPolicy {
                max_wait_ms,
                max_attempts,
            },
            shuffle_candidates,
        })
    }
}

async fn load_or_default<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr + Copy + std::fmt::Display,
{
    let raw = get_setting(pool, key).await?;
    Ok(parse_or_default(key, raw.as_deref(), default))
}

fn parse_or_default<T>(key: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match raw {
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    setting = key,
                    value,
                    default = %default,
                    "Unparseable setting, using default"
                );
                default
            }
        },
        None => default,
    }
}
