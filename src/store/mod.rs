//! Durable player identity and win counts.
//!
//! The game only needs two operations from storage: resolve a name to a
//! player record (creating it on first sight) and bump a player's win count.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::game::state::PlayerId;

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Stored player identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub wins: u32,
}

impl PlayerRecord {
    /// Fresh record with a new id and no wins
    pub fn create(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            wins: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("player {0} not found in store")]
    NotFound(PlayerId),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store file too large ({size} bytes > {limit} limit)")]
    TooLarge { size: u64, limit: u64 },
    #[error("store unavailable: {0}")]
    Backend(String),
}

/// Player store used by the session driver
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Look a player up by name, creating a record with zero wins if absent
    fn find_or_create(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<PlayerRecord, PersistenceError>> + Send;

    /// Add one win to the player's durable count and return the new count
    fn increment_wins(
        &self,
        id: PlayerId,
    ) -> impl Future<Output = Result<u32, PersistenceError>> + Send;
}
