pub mod animate;
pub mod driver;
pub mod export;
pub mod geo;
pub mod intake;
pub mod milestones;
pub mod progress;
pub mod rasterize;
pub mod render;
pub mod route;
pub mod session;
