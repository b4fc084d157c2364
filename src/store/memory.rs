use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{PersistenceError, PersistenceGateway, PlayerRecord};
use crate::game::state::PlayerId;

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<PlayerId, PlayerRecord>,
    by_name: HashMap<String, PlayerId>,
}

/// Process-local player store; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PlayerId) -> Option<PlayerRecord> {
        self.records.lock().by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceGateway for MemoryStore {
    async fn find_or_create(&self, name: &str) -> Result<PlayerRecord, PersistenceError> {
        let mut records = self.records.lock();
        if let Some(id) = records.by_name.get(name).copied() {
            if let Some(record) = records.by_id.get(&id) {
                return Ok(record.clone());
            }
        }

        let record = PlayerRecord::create(name);
        records.by_name.insert(record.name.clone(), record.id);
        records.by_id.insert(record.id, record.clone());
        tracing::debug!("Created player record {} for '{}'", record.id, name);
        Ok(record)
    }

    async fn increment_wins(&self, id: PlayerId) -> Result<u32, PersistenceError> {
        let mut records = self.records.lock();
        let record = records
            .by_id
            .get_mut(&id)
            .ok_or(PersistenceError::NotFound(id))?;
        record.wins += 1;
        Ok(record.wins)
    }
}
