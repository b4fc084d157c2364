//! Connected players keyed by id.

use hashbrown::HashMap;
use rand::Rng;

use crate::game::session::GameError;
use crate::game::state::{ArenaBounds, Player, PlayerId};
use crate::util::color::random_color;
use crate::util::vec2::Vec2;

#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    bounds: ArenaBounds,
    starting_radius: f32,
    players: HashMap<PlayerId, Player>,
}

impl PlayerRegistry {
    pub fn new(bounds: ArenaBounds, starting_radius: f32) -> Self {
        Self {
            bounds,
            starting_radius,
            players: HashMap::new(),
        }
    }

    /// Place a player at a random position with spawn defaults.
    ///
    /// An existing entry for `id` is overwritten: logging in again always respawns.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        id: PlayerId,
        name: String,
        prior_wins: u32,
        rng: &mut R,
    ) -> &Player {
        let position = self.bounds.random_point(rng);
        let player = Player::new(id, name, position, self.starting_radius, random_color(rng), prior_wins);
        if self.players.insert(id, player).is_some() {
            tracing::debug!("Respawned existing player {}", id);
        }
        &self.players[&id]
    }

    /// Overwrite a player's position without clamping
    pub fn update_position(&mut self, id: PlayerId, position: Vec2) -> Result<&mut Player, GameError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(GameError::UnknownPlayer(id))?;
        player.position = position;
        Ok(player)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// All players keyed by id
    pub fn all(&self) -> &HashMap<PlayerId, Player> {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn registry() -> (PlayerRegistry, StdRng) {
        (
            PlayerRegistry::new(ArenaBounds::new(2000.0, 2000.0), 20.0),
            StdRng::seed_from_u64(21),
        )
    }

    #[test]
    fn test_spawn_defaults() {
        let (mut registry, mut rng) = registry();
        let id = Uuid::new_v4();

        let player = registry.spawn(id, "Alice".to_string(), 4, &mut rng).clone();

        assert_eq!(player.id, id);
        assert_eq!(player.name, "Alice");
        assert_eq!(player.radius, 20.0);
        assert_eq!(player.score, 0);
        assert_eq!(player.wins, 4);
        assert!(ArenaBounds::new(2000.0, 2000.0).contains(player.position));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_respawn_overwrites() {
        let (mut registry, mut rng) = registry();
        let id = Uuid::new_v4();
        registry.spawn(id, "Alice".to_string(), 0, &mut rng);
        {
            let player = registry.get_mut(id).unwrap();
            player.consume(1.0);
            player.consume(1.0);
        }

        let player = registry.spawn(id, "Alice".to_string(), 1, &mut rng);

        assert_eq!(player.score, 0);
        assert_eq!(player.radius, 20.0);
        assert_eq!(player.wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_position_unclamped() {
        let (mut registry, mut rng) = registry();
        let id = Uuid::new_v4();
        registry.spawn(id, "Bob".to_string(), 0, &mut rng);

        let player = registry.update_position(id, Vec2::new(-500.0, 99_999.0)).unwrap();

        assert_eq!(player.position, Vec2::new(-500.0, 99_999.0));
    }

    #[test]
    fn test_update_unknown_player() {
        let (mut registry, _) = registry();
        let id = Uuid::new_v4();

        let result = registry.update_position(id, Vec2::new(1.0, 1.0));

        assert!(matches!(result, Err(GameError::UnknownPlayer(missing)) if missing == id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let (mut registry, mut rng) = registry();
        let id = Uuid::new_v4();
        registry.spawn(id, "Carol".to_string(), 0, &mut rng);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_all_snapshot() {
        let (mut registry, mut rng) = registry();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.spawn(a, "A".to_string(), 0, &mut rng);
        registry.spawn(b, "B".to_string(), 2, &mut rng);

        let all = registry.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&a].name, "A");
        assert_eq!(all[&b].wins, 2);

        registry.clear();
        assert!(registry.is_empty());
    }
}
