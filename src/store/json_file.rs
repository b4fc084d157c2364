//! Player store persisted as a JSON file.
//!
//! The whole file is rewritten after every mutation. Writes are serialized
//! by an async mutex so a slow disk only delays other store calls.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{PersistenceError, PersistenceGateway, PlayerRecord};
use crate::game::state::PlayerId;

/// Refuse to load store files above this size
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    players: Vec<PlayerRecord>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            players: Vec::new(),
        }
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    file: Mutex<StoreFile>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        let file = match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                if metadata.len() > MAX_FILE_SIZE {
                    return Err(PersistenceError::TooLarge {
                        size: metadata.len(),
                        limit: MAX_FILE_SIZE,
                    });
                }
                let contents = tokio::fs::read_to_string(&path).await?;
                let file: StoreFile = serde_json::from_str(&contents)?;
                info!("Loaded {} player records from {}", file.players.len(), path.display());
                file
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing store at {}, starting empty", path.display());
                StoreFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.file.lock().await.players.len()
    }

    async fn save(&self, file: &StoreFile) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let contents = serde_json::to_string_pretty(file)?;
        tokio::fs::write(&self.path, contents).await?;
        debug!("Saved {} player records to {}", file.players.len(), self.path.display());
        Ok(())
    }
}

impl PersistenceGateway for JsonFileStore {
    async fn find_or_create(&self, name: &str) -> Result<PlayerRecord, PersistenceError> {
        let mut file = self.file.lock().await;
        if let Some(record) = file.players.iter().find(|r| r.name == name) {
            return Ok(record.clone());
        }

        let record = PlayerRecord::create(name);
        file.players.push(record.clone());
        if let Err(e) = self.save(&file).await {
            file.players.pop();
            return Err(e);
        }
        Ok(record)
    }

    async fn increment_wins(&self, id: PlayerId) -> Result<u32, PersistenceError> {
        let mut file = self.file.lock().await;
        let index = file
            .players
            .iter()
            .position(|r| r.id == id)
            .ok_or(PersistenceError::NotFound(id))?;

        file.players[index].wins += 1;
        if let Err(e) = self.save(&file).await {
            file.players[index].wins -= 1;
            return Err(e);
        }
        Ok(file.players[index].wins)
    }
}
