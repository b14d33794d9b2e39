//! Candidate images
//!
//! The tournament core only ever reads ids from these; the descriptive
//! fields pass through to whoever renders a matchup.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An image that can take part in a tournament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateImage {
    pub id: Uuid,
    pub category: String,
    pub image_url: String,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,

    /// selections / views, maintained from the stat outbox
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub total_views: i64,
    #[serde(default)]
    pub total_selections: i64,
}

/// Catalog insert payload (used by `import-images`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidateImage {
    pub category: String,
    pub image_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-category image count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub image_count: i64,
    /// Enough active images to start the smallest bracket
    pub available: bool,
}
