pub mod broadcast;
pub mod framing;
pub mod game_session;
pub mod protocol;
pub mod tls;
pub mod transport;
