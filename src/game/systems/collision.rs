//! Consumption detection between a player and the food field.

use rand::Rng;
use smallvec::SmallVec;

use crate::game::state::{Circle, Player};
use crate::game::systems::food::FoodField;

/// Two circles overlap when their centers are strictly closer than the sum of
/// their radii. Touching exactly at the boundary does not count.
#[inline]
pub fn overlaps(a: Circle, b: Circle) -> bool {
    a.center.distance_to(b.center) < a.radius + b.radius
}

/// Consume every particle the player overlaps, in one pass over the field.
///
/// Particles are tested from the last index down to the first against the
/// player's current radius, which grows with each hit. A hit can bring
/// lower-indexed particles into reach but never re-tests higher ones.
/// Matched particles are replaced after the pass in the order they were hit,
/// which is highest index first. Returns how many particles were consumed.
pub fn resolve_consumption<R: Rng + ?Sized>(
    player: &mut Player,
    food: &mut FoodField,
    growth: f32,
    rng: &mut R,
) -> usize {
    let mut consumed: SmallVec<[usize; 8]> = SmallVec::new();

    for (index, particle) in food.iter().enumerate().rev() {
        if overlaps(player.circle(), particle.circle()) {
            player.consume(growth);
            consumed.push(index);
        }
    }

    for &index in consumed.iter() {
        food.replace(index, rng);
    }

    consumed.len()
}
