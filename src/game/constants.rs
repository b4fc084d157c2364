//! Default game and network constants.
//!
//! These are the values the arena ships with; `GameConfig` can override the
//! game values from the environment.

/// Arena dimensions (top-left corner is the origin)
pub mod arena {
    /// Arena width in world units
    pub const WIDTH: f32 = 2000.0;
    /// Arena height in world units
    pub const HEIGHT: f32 = 2000.0;
}

/// Food field constants
pub mod food {
    /// Number of food particles kept in the field at all times
    pub const COUNT: usize = 100;
    /// Radius of every food particle
    pub const RADIUS: f32 = 5.0;
}

/// Player constants
pub mod player {
    /// Radius a player spawns with
    pub const STARTING_RADIUS: f32 = 20.0;
    /// Radius gained per consumed food particle
    pub const GROWTH_PER_FOOD: f32 = 1.0;
    /// Maximum display name length after sanitization
    pub const MAX_NAME_LEN: usize = 32;
}

/// Round constants
pub mod round {
    /// Score at which a player wins the round
    pub const WIN_SCORE: u32 = 700;
}

/// Network constants
pub mod net {
    /// Maximum framed message size (64KB)
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Maximum datagram size
    pub const MAX_DATAGRAM_SIZE: usize = 1200;
    /// Frames queued per connection before new frames are dropped
    pub const OUTBOUND_QUEUE: usize = 64;
}
