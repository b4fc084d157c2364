//! Arena entities: players, food particles and the shapes used to test them.

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::color::random_color;
use crate::util::vec2::Vec2;

/// Unique player identifier, assigned by the persistence gateway
pub type PlayerId = Uuid;

/// Circle used by the consumption test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Fixed-size arena, origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaBounds {
    pub width: f32,
    pub height: f32,
}

impl ArenaBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Uniformly distributed point in `[0, width) x [0, height)`
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            rng.gen_range(0.0..self.width),
            rng.gen_range(0.0..self.height),
        )
    }

    #[cfg(test)]
    pub fn contains(&self, point: Vec2) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }
}

/// A connected player's arena state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Display name, fixed at spawn
    pub name: String,
    /// Last reported position (trusted as sent by the client)
    pub position: Vec2,
    pub radius: f32,
    pub color: String,
    /// Food consumed this round
    pub score: u32,
    /// Cached copy of the durable win counter
    pub wins: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: String, position: Vec2, radius: f32, color: String, wins: u32) -> Self {
        Self {
            id,
            name,
            position,
            radius,
            color,
            score: 0,
            wins,
        }
    }

    pub fn circle(&self) -> Circle {
        Circle::new(self.position, self.radius)
    }

    /// Apply one consumption: grow and score
    pub fn consume(&mut self, growth: f32) {
        self.radius += growth;
        self.score += 1;
    }
}

/// A consumable food particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodParticle {
    pub position: Vec2,
    pub radius: f32,
    pub color: String,
}

impl FoodParticle {
    pub fn new(position: Vec2, radius: f32, color: String) -> Self {
        Self {
            position,
            radius,
            color,
        }
    }

    /// Randomly placed particle within `bounds`
    pub fn random<R: Rng + ?Sized>(bounds: &ArenaBounds, radius: f32, rng: &mut R) -> Self {
        let position = bounds.random_point(rng);
        Self::new(position, radius, random_color(rng))
    }

    pub fn circle(&self) -> Circle {
        Circle::new(self.position, self.radius)
    }
}
