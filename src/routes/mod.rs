pub mod geocode;
pub mod health;
pub mod render;
pub mod tracking;
