pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod io;
pub mod measurement;
pub mod render;
pub mod system;
