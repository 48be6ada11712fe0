pub mod geo;
pub mod map;
pub mod order;
pub mod tracking;
