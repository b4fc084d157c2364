//! Food field: the fixed-size set of consumable particles.
//!
//! The field is filled in bulk at start-up and on every round reset. A consumed
//! particle is swapped for a freshly spawned one so the count never changes
//! between those bulk fills.

use rand::Rng;

use crate::game::state::{ArenaBounds, FoodParticle};

#[derive(Debug, Clone)]
pub struct FoodField {
    bounds: ArenaBounds,
    particle_radius: f32,
    particles: Vec<FoodParticle>,
}

impl FoodField {
    /// Empty field; call `initialize` to populate it
    pub fn new(bounds: ArenaBounds, particle_radius: f32) -> Self {
        Self {
            bounds,
            particle_radius,
            particles: Vec::new(),
        }
    }

    /// Field with caller-supplied particles, in the given order
    pub fn from_particles(bounds: ArenaBounds, particle_radius: f32, particles: Vec<FoodParticle>) -> Self {
        Self {
            bounds,
            particle_radius,
            particles,
        }
    }

    /// Discard every particle and spawn `count` new ones
    pub fn initialize<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) {
        self.particles.clear();
        self.particles.reserve(count);
        for _ in 0..count {
            let particle = self.spawn(rng);
            self.particles.push(particle);
        }
        tracing::debug!("Food field initialized with {} particles", count);
    }

    /// Remove the particle at `index` and append a new random one.
    ///
    /// Returns the removed particle; an out-of-range index leaves the field untouched.
    pub fn replace<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) -> Option<FoodParticle> {
        if index >= self.particles.len() {
            return None;
        }
        let removed = self.particles.remove(index);
        let particle = self.spawn(rng);
        self.particles.push(particle);
        Some(removed)
    }

    fn spawn<R: Rng + ?Sized>(&self, rng: &mut R) -> FoodParticle {
        FoodParticle::random(&self.bounds, self.particle_radius, rng)
    }

    pub fn particles(&self) -> &[FoodParticle] {
        &self.particles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FoodParticle> {
        self.particles.iter()
    }

    pub fn get(&self, index: usize) -> Option<&FoodParticle> {
        self.particles.get(index)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn bounds(&self) -> ArenaBounds {
        self.bounds
    }
}
