pub mod config;
pub mod error;
pub mod geocode;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod types;
