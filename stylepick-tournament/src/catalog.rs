//! Image catalog boundary
//!
//! The tournament core reads candidates through [`ImageCatalog`] and never
//! writes catalog rows. View and selection counts travel through the
//! `catalog_stat_events` outbox, written inside the choice transaction and
//! folded into the image counters later by [`SqliteCatalog::apply_stat_events`].

use crate::bracket::MIN_TOURNAMENT_SIZE;
use crate::db::{from_json, parse_uuid, to_json};
use crate::models::{CandidateImage, CategorySummary, NewCandidateImage};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use stylepick_common::db::{retry_on_lock, RetryPolicy};
use stylepick_common::time::{now, to_db};
use stylepick_common::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// Read side of the image catalog
#[async_trait]
pub trait ImageCatalog: Send + Sync + 'static {
    /// Active images in `category`, randomized, at most `limit`
    ///
    /// Unknown or empty categories are `NotFound`.
    async fn fetch_candidates(&self, category: &str, limit: usize) -> Result<Vec<CandidateImage>>;

    /// Images by id, in the order requested; unknown ids are skipped
    async fn get_images(&self, ids: &[Uuid]) -> Result<Vec<CandidateImage>>;

    /// Every category with its active image count
    async fn list_categories(&self) -> Result<Vec<CategorySummary>>;
}

/// Catalog stored in the shared SQLite database
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    retry: RetryPolicy,
}

/// Outcome of one outbox drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatDrainReport {
    pub events_applied: u64,
    pub images_updated: u64,
}

const IMAGE_COLUMNS: &str = "guid, category, image_url, thumbnail_url, title, description, tags, \
                             win_rate, total_views, total_selections";

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    /// Lock-retry budget for catalog writes
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Insert a new active image
    pub async fn add_image(&self, image: NewCandidateImage) -> Result<CandidateImage> {
        if image.category.trim().is_empty() || image.image_url.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Images need a category and an image_url".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let thumbnail = image
            .thumbnail_url
            .clone()
            .unwrap_or_else(|| image.image_url.clone());
        let timestamp = to_db(&now());

        sqlx::query(
            r#"
            INSERT INTO candidate_images
                (guid, category, image_url, thumbnail_url, title, description, tags,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&image.category)
        .bind(&image.image_url)
        .bind(&thumbnail)
        .bind(&image.title)
        .bind(&image.description)
        .bind(to_json(&image.tags)?)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        debug!(image_id = %id, category = %image.category, "Added candidate image");

        Ok(CandidateImage {
            id,
            category: image.category,
            image_url: image.image_url,
            thumbnail_url: Some(thumbnail),
            title: image.title,
            description: image.description,
            tags: image.tags,
            win_rate: 0.0,
            total_views: 0,
            total_selections: 0,
        })
    }

    /// Hide or re-enable an image for future tournaments
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE candidate_images SET active = ?, updated_at = ? WHERE guid = ?",
        )
        .bind(active)
        .bind(to_db(&now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!("Image {}", id)));
        }
        Ok(())
    }

    /// Fold pending outbox events into the image counters
    ///
    /// Only events up to the highest id seen at the start are applied, so
    /// choices recorded concurrently are left for the next drain. A choice
    /// committing mid-drain makes the drain retry from scratch.
    pub async fn apply_stat_events(&self) -> Result<StatDrainReport> {
        retry_on_lock("apply_stat_events", self.retry, || self.drain_stat_events()).await
    }

    async fn drain_stat_events(&self) -> Result<StatDrainReport> {
        let mut tx = self.pool.begin().await?;

        let high_water: Option<i64> =
            sqlx::query_scalar("SELECT MAX(id) FROM catalog_stat_events WHERE applied_at IS NULL")
                .fetch_one(&mut *tx)
                .await?;
        let Some(high_water) = high_water else {
            return Ok(StatDrainReport::default());
        };

        let rows = sqlx::query(
            r#"
            SELECT image_id,
                   SUM(CASE WHEN kind = 'view' THEN 1 ELSE 0 END) AS views,
                   SUM(CASE WHEN kind = 'selection' THEN 1 ELSE 0 END) AS selections
            FROM catalog_stat_events
            WHERE applied_at IS NULL AND id <= ?
            GROUP BY image_id
            "#,
        )
        .bind(high_water)
        .fetch_all(&mut *tx)
        .await?;

        let timestamp = to_db(&now());
        let mut images_updated = 0u64;
        for row in &rows {
            let image_id: String = row.try_get("image_id")?;
            let views: i64 = row.try_get("views")?;
            let selections: i64 = row.try_get("selections")?;

            images_updated += sqlx::query(
                r#"
                UPDATE candidate_images
                SET total_views = total_views + ?,
                    total_selections = total_selections + ?,
                    win_rate = CASE WHEN total_views + ? > 0
                        THEN CAST(total_selections + ? AS REAL) / (total_views + ?)
                        ELSE 0.0 END,
                    updated_at = ?
                WHERE guid = ?
                "#,
            )
            .bind(views)
            .bind(selections)
            .bind(views)
            .bind(selections)
            .bind(views)
            .bind(&timestamp)
            .bind(&image_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        let events_applied = sqlx::query(
            "UPDATE catalog_stat_events SET applied_at = ? WHERE applied_at IS NULL AND id <= ?",
        )
        .bind(&timestamp)
        .bind(high_water)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(events_applied, images_updated, "Applied catalog statistics");

        Ok(StatDrainReport {
            events_applied,
            images_updated,
        })
    }
}

#[async_trait]
impl ImageCatalog for SqliteCatalog {
    async fn fetch_candidates(&self, category: &str, limit: usize) -> Result<Vec<CandidateImage>> {
        let sql = format!(
            "SELECT {} FROM candidate_images WHERE category = ? AND active = 1 ORDER BY RANDOM() LIMIT ?",
            IMAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(category)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(Error::NotFound(format!(
                "No active images in category '{}'",
                category
            )));
        }

        rows.iter().map(image_from_row).collect()
    }

    async fn get_images(&self, ids: &[Uuid]) -> Result<Vec<CandidateImage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM candidate_images WHERE guid IN ({})",
            IMAGE_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_id: HashMap<Uuid, CandidateImage> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let image = image_from_row(row)?;
            by_id.insert(image.id, image);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_categories(&self) -> Result<Vec<CategorySummary>> {
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS image_count
            FROM candidate_images
            WHERE active = 1
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CategorySummary> {
                let image_count: i64 = row.try_get("image_count")?;
                Ok(CategorySummary {
                    category: row.try_get("category")?,
                    image_count,
                    available: image_count >= MIN_TOURNAMENT_SIZE as i64,
                })
            })
            .collect()
    }
}

/// Queue view/selection increments for a resolved matchup
///
/// Runs inside the choice transaction; only inserts into the outbox.
pub(crate) async fn enqueue_stat_events(
    conn: &mut SqliteConnection,
    option_a: Uuid,
    option_b: Uuid,
    winner: Uuid,
) -> Result<()> {
    let timestamp = to_db(&now());
    sqlx::query(
        r#"
        INSERT INTO catalog_stat_events (image_id, kind, created_at)
        VALUES (?, 'view', ?), (?, 'view', ?), (?, 'selection', ?)
        "#,
    )
    .bind(option_a.to_string())
    .bind(&timestamp)
    .bind(option_b.to_string())
    .bind(&timestamp)
    .bind(winner.to_string())
    .bind(&timestamp)
    .execute(conn)
    .await?;

    Ok(())
}

fn image_from_row(row: &SqliteRow) -> Result<CandidateImage> {
    let guid: String = row.try_get("guid")?;
    let tags: String = row.try_get("tags")?;

    Ok(CandidateImage {
        id: parse_uuid("candidate_images.guid", &guid)?,
        category: row.try_get("category")?,
        image_url: row.try_get("image_url")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        tags: from_json("candidate_images.tags", &tags)?,
        win_rate: row.try_get("win_rate")?,
        total_views: row.try_get("total_views")?,
        total_selections: row.try_get("total_selections")?,
    })
}
