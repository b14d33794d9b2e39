//! Shared fixtures for tournament integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use stylepick_common::db::init_database;
use stylepick_common::{Error, EventBus, Result};
use stylepick_tournament::bracket::Matchup;
use stylepick_tournament::models::{
    CandidateImage, CategorySummary, ChoiceSubmission, NewCandidateImage, TournamentSession,
};
use stylepick_tournament::{ImageCatalog, SqliteCatalog, TournamentService, TournamentSettings};
use tempfile::TempDir;
use uuid::Uuid;

/// Temp-dir database plus a service over the SQLite catalog
pub struct TestEnv {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub service: TournamentService<SqliteCatalog>,
}

/// Settings with shuffling off so bracket order follows the catalog
pub fn test_settings() -> TournamentSettings {
    TournamentSettings {
        shuffle_candidates: false,
        ..Default::default()
    }
}

pub async fn setup() -> TestEnv {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("stylepick.db")).await.unwrap();
    let service = TournamentService::new(
        pool.clone(),
        SqliteCatalog::new(pool.clone()),
        test_settings(),
        EventBus::new(256),
    );
    TestEnv {
        _dir: dir,
        pool,
        service,
    }
}

pub fn new_image(category: &str, n: usize) -> NewCandidateImage {
    NewCandidateImage {
        category: category.to_string(),
        image_url: format!("https://img.example/{}/{}.jpg", category, n),
        thumbnail_url: None,
        title: Some(format!("{} #{}", category, n)),
        description: None,
        tags: vec![category.to_string()],
    }
}

pub async fn seed_images(catalog: &SqliteCatalog, category: &str, count: usize) -> Vec<CandidateImage> {
    let mut images = Vec::with_capacity(count);
    for n in 0..count {
        images.push(catalog.add_image(new_image(category, n)).await.unwrap());
    }
    images
}

pub fn pair(option_a: Uuid, option_b: Uuid) -> Matchup {
    Matchup { option_a, option_b }
}

/// Answer `matchup` in favour of `winner`
pub fn pick(matchup: Matchup, winner: Uuid, response_time_ms: u64) -> ChoiceSubmission {
    ChoiceSubmission {
        matchup,
        winner_id: winner,
        response_time_ms,
        confidence_level: None,
    }
}

/// Answer every matchup with `choose` until the session completes
pub async fn play_out<C: ImageCatalog>(
    service: &TournamentService<C>,
    session_id: Uuid,
    choose: impl Fn(Matchup) -> Uuid,
) -> TournamentSession {
    let mut session = service.get_session(session_id).await.unwrap();
    while let Some(matchup) = session.current_matchup() {
        session = service
            .submit_choice(session_id, pick(matchup, choose(matchup), 1200))
            .await
            .unwrap();
    }
    session
}

pub async fn count_rows(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

/// Catalog serving a fixed, ordered image list
pub struct FixedCatalog {
    images: Vec<CandidateImage>,
}

impl FixedCatalog {
    pub fn new(category: &str, count: usize) -> Self {
        let images = (0..count)
            .map(|n| CandidateImage {
                id: Uuid::new_v4(),
                category: category.to_string(),
                image_url: format!("https://img.example/fixed/{}.jpg", n),
                thumbnail_url: None,
                title: None,
                description: None,
                tags: Vec::new(),
                win_rate: 0.0,
                total_views: 0,
                total_selections: 0,
            })
            .collect();
        Self { images }
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.images.iter().map(|i| i.id).collect()
    }
}

#[async_trait]
impl ImageCatalog for FixedCatalog {
    async fn fetch_candidates(&self, category: &str, limit: usize) -> Result<Vec<CandidateImage>> {
        let images: Vec<CandidateImage> = self
            .images
            .iter()
            .filter(|i| i.category == category)
            .take(limit)
            .cloned()
            .collect();
        if images.is_empty() {
            return Err(Error::NotFound(format!("category '{}'", category)));
        }
        Ok(images)
    }

    async fn get_images(&self, ids: &[Uuid]) -> Result<Vec<CandidateImage>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.images.iter().find(|i| i.id == *id).cloned())
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<CategorySummary>> {
        let count = self.images.len() as i64;
        let category = self
            .images
            .first()
            .map(|i| i.category.clone())
            .unwrap_or_default();
        Ok(vec![CategorySummary {
            category,
            image_count: count,
            available: count >= 4,
        }])
    }
}

/// Service over a [`FixedCatalog`] on a fresh database
pub async fn setup_fixed(category: &str, count: usize) -> (TempDir, SqlitePool, TournamentService<FixedCatalog>, Vec<Uuid>) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("stylepick.db")).await.unwrap();
    let catalog = FixedCatalog::new(category, count);
    let ids = catalog.ids();
    let service = TournamentService::new(pool.clone(), catalog, test_settings(), EventBus::new(64));
    (dir, pool, service, ids)
}
