use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::session::GameSession;
use crate::game::state::{FoodParticle, Player, PlayerId};
use crate::util::vec2::Vec2;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Log in by display name (creates the player record on first use)
    Login { name: String },
    /// Client is ready to play as `id`
    Ready { id: PlayerId },
    /// Position report for `id`
    Position { id: PlayerId, x: f32, y: f32 },
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Login succeeded; the player has been spawned
    LoginAccepted {
        id: PlayerId,
        wins: u32,
        state: GameSnapshot,
    },
    /// Login failed
    LoginRejected { reason: String },
    /// Reply to `Ready` with the full state
    Init { id: PlayerId, state: GameSnapshot },
    /// Full state after a position change or a departure
    Update(GameSnapshot),
    /// A player won the round
    Win { id: PlayerId },
    /// Fresh state after a round reset
    Reset(GameSnapshot),
}

/// Full arena state for network transmission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub players: HashMap<PlayerId, PlayerSnapshot>,
    pub food: Vec<FoodSnapshot>,
}

impl GameSnapshot {
    pub fn from_session(session: &GameSession) -> Self {
        Self {
            players: session
                .players()
                .all()
                .iter()
                .map(|(id, player)| (*id, PlayerSnapshot::from_player(player)))
                .collect(),
            food: session.food().iter().map(FoodSnapshot::from_food).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub name: String,
    pub position: Vec2,
    pub radius: f32,
    pub color: String,
    pub score: u32,
    pub wins: u32,
}

impl PlayerSnapshot {
    pub fn from_player(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            position: player.position,
            radius: player.radius,
            color: player.color.clone(),
            score: player.score,
            wins: player.wins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodSnapshot {
    pub position: Vec2,
    pub radius: f32,
    pub color: String,
}

impl FoodSnapshot {
    pub fn from_food(food: &FoodParticle) -> Self {
        Self {
            position: food.position,
            radius: food.radius,
            color: food.color.clone(),
        }
    }
}

/// Inbound payload that cannot be acted on
#[derive(Debug, thiserror::Error)]
pub enum MalformedMessage {
    #[error("undecodable message: {0}")]
    Undecodable(#[from] DecodeError),
    #[error("non-finite position ({x}, {y}) from {id}")]
    NonFiniteCoordinates { id: PlayerId, x: f32, y: f32 },
}

/// Decode and sanity-check a client message
pub fn decode_client(data: &[u8]) -> Result<ClientMessage, MalformedMessage> {
    let message: ClientMessage = decode(data)?;
    if let ClientMessage::Position { id, x, y } = message {
        if !Vec2::new(x, y).is_finite() {
            return Err(MalformedMessage::NonFiniteCoordinates { id, x, y });
        }
    }
    Ok(message)
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (simple to decode on the client)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
