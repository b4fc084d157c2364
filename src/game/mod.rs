pub mod constants;
pub mod registry;
pub mod session;
pub mod state;
pub mod systems;
