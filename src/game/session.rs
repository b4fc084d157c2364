//! Round orchestration: one registry, one food field, the win latch.
//!
//! `GameSession` is pure state; it never performs I/O. The async driver in
//! `net::game_session` feeds it one event at a time and performs the durable
//! win write between `update_position` reserving the latch and
//! `finish_win`/`abort_win` settling it.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::game::registry::PlayerRegistry;
use crate::game::state::{ArenaBounds, Player, PlayerId};
use crate::game::systems::collision::resolve_consumption;
use crate::game::systems::food::FoodField;
use crate::util::vec2::Vec2;

/// Errors returned by session operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("player {0} not found")]
    UnknownPlayer(PlayerId),
    #[error("position from {0} ignored, round not in progress")]
    NotInProgress(PlayerId),
    #[error("round is being won by {winner}, updates suspended")]
    WinPending { winner: PlayerId },
    #[error("no win reserved for player {0}")]
    NoWinReserved(PlayerId),
}

/// Observable round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No client has signalled ready since start-up or the last reset
    Idle,
    /// Accepting position reports
    InProgress,
    /// A player crossed the win score; waiting for the durable win write
    WinPending,
}

/// Single-assignment win latch, cleared only by a reset (or an aborted write)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinLatch {
    #[default]
    Open,
    Reserved(PlayerId),
}

/// Result of an accepted position report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Position applied; state should be broadcast
    Moved { consumed: usize },
    /// Position applied and the player crossed the win score; the latch is now
    /// reserved for them and the durable win write must follow
    WinReserved {
        id: PlayerId,
        score: u32,
        consumed: usize,
    },
}

/// Summary of a completed win
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinSummary {
    pub id: PlayerId,
    /// Winner's name, if they were still connected when the win completed
    pub name: Option<String>,
    /// Durable win count after the increment
    pub wins: u32,
    /// Round number that was won
    pub round: u64,
}

pub struct GameSession {
    config: GameConfig,
    registry: PlayerRegistry,
    food: FoodField,
    in_progress: bool,
    latch: WinLatch,
    round: u64,
    rng: StdRng,
}

impl GameSession {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Session with a fixed seed (deterministic spawns and food)
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, mut rng: StdRng) -> Self {
        let bounds = ArenaBounds::new(config.arena_width, config.arena_height);
        let registry = PlayerRegistry::new(bounds, config.starting_radius);
        let mut food = FoodField::new(bounds, config.food_radius);
        food.initialize(config.food_count, &mut rng);

        Self {
            config,
            registry,
            food,
            in_progress: false,
            latch: WinLatch::Open,
            round: 1,
            rng,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn food(&self) -> &FoodField {
        &self.food
    }

    /// Replace the food field, e.g. to stage a known layout
    pub fn set_food(&mut self, food: FoodField) {
        self.food = food;
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn latch(&self) -> WinLatch {
        self.latch
    }

    pub fn phase(&self) -> SessionPhase {
        match self.latch {
            WinLatch::Reserved(_) => SessionPhase::WinPending,
            WinLatch::Open if self.in_progress => SessionPhase::InProgress,
            WinLatch::Open => SessionPhase::Idle,
        }
    }

    /// Spawn (or respawn) a logged-in player
    pub fn spawn_player(&mut self, id: PlayerId, name: String, prior_wins: u32) -> &Player {
        info!("Spawning player {} ({}) with {} wins", name, id, prior_wins);
        self.registry.spawn(id, name, prior_wins, &mut self.rng)
    }

    /// A client signalled ready. Every signal re-arms the round.
    pub fn mark_ready(&mut self) {
        if !self.in_progress {
            info!("Round {} in progress", self.round);
        }
        self.in_progress = true;
    }

    /// Apply a position report and resolve consumption.
    ///
    /// The report that crosses the win score is still applied before the
    /// latch is reserved; while it is reserved every report is refused.
    pub fn update_position(&mut self, id: PlayerId, position: Vec2) -> Result<UpdateOutcome, GameError> {
        if !self.registry.contains(id) {
            return Err(GameError::UnknownPlayer(id));
        }
        if let WinLatch::Reserved(winner) = self.latch {
            return Err(GameError::WinPending { winner });
        }
        if !self.in_progress {
            return Err(GameError::NotInProgress(id));
        }

        let player = self.registry.update_position(id, position)?;
        let consumed = resolve_consumption(
            player,
            &mut self.food,
            self.config.growth_per_food,
            &mut self.rng,
        );
        if consumed > 0 {
            debug!("Player {} consumed {} food, score {}", id, consumed, player.score);
        }

        if player.score >= self.config.win_score {
            let score = player.score;
            self.latch = WinLatch::Reserved(id);
            info!("Player {} reached {} points, win reserved", id, score);
            return Ok(UpdateOutcome::WinReserved { id, score, consumed });
        }

        Ok(UpdateOutcome::Moved { consumed })
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.registry.remove(id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Settle a reserved win after the durable increment succeeded, then reset.
    pub fn finish_win(&mut self, id: PlayerId, durable_wins: u32) -> Result<WinSummary, GameError> {
        if self.latch != WinLatch::Reserved(id) {
            return Err(GameError::NoWinReserved(id));
        }

        let name = self.registry.get_mut(id).map(|player| {
            player.wins = durable_wins;
            player.name.clone()
        });
        let summary = WinSummary {
            id,
            name,
            wins: durable_wins,
            round: self.round,
        };
        info!("Player {} won round {} ({} total wins)", id, self.round, durable_wins);

        self.reset();
        Ok(summary)
    }

    /// Release a reserved win after the durable increment failed.
    ///
    /// Scores are left as they are so the next qualifying report retries.
    pub fn abort_win(&mut self, id: PlayerId) -> bool {
        if self.latch == WinLatch::Reserved(id) {
            self.latch = WinLatch::Open;
            true
        } else {
            false
        }
    }

    /// Start a fresh round: no players, new food, latch open, idle
    pub fn reset(&mut self) {
        self.registry.clear();
        self.food.initialize(self.config.food_count, &mut self.rng);
        self.in_progress = false;
        self.latch = WinLatch::Open;
        self.round += 1;
        info!("Session reset, round {} waiting for players", self.round);
    }
}
