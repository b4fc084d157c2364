pub mod collision;
pub mod food;
