//! # StylePick Common Library
//!
//! Shared code for the StylePick crates:
//! - Error taxonomy
//! - Bootstrap configuration loading
//! - Database initialization, migrations and lock retry
//! - Event types (StyleEvent) and EventBus
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, SessionStatus, StyleEvent};
