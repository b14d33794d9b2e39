//! StylePick tournament library
//!
//! Single-elimination pairwise tournaments over candidate images:
//! - Bracket reduction engine (sequential queue reduction)
//! - Session lifecycle state machine
//! - Choice ledger and result finalization
//! - Image catalog boundary
//! - [`TournamentService`] tying them together over SQLite

pub mod bracket;
pub mod catalog;
pub mod db;
pub mod finalizer;
pub mod models;
pub mod service;
pub mod settings;

pub use catalog::{ImageCatalog, SqliteCatalog, StatDrainReport};
pub use service::TournamentService;
pub use settings::TournamentSettings;
