pub mod audio;
pub mod cli;
pub mod config;
pub mod controls;
pub mod error;
pub mod logging;
pub mod markers;
pub mod models;
pub mod session;

#[cfg(test)]
mod integration_tests;

pub use error::*;
pub use models::*;
