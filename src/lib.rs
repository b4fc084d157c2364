//! Blob Arena Server Library
//!
//! Authoritative state engine for a browser arena game: players steer
//! circles around a fixed field, grow by eating food, and the first to reach
//! the win score ends the round for everyone.
//!
//! Clients talk to the server over WebTransport (see [`net`]). Durable player
//! identity and win counts live behind [`store::PersistenceGateway`].

pub mod config;
pub mod util;
pub mod game;
pub mod store;
pub mod net;
pub mod metrics;
