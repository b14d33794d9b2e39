//! Tournament persistence
//!
//! Row mapping for sessions, the choice ledger and results. Functions that
//! take a generic executor run either on the pool or inside the caller's
//! transaction.

pub mod choices;
pub mod results;
pub mod sessions;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stylepick_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in {}: '{}' ({})", column, value, e)))
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}
