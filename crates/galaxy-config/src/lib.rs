//! Configuration system for the galaxy renderer.
//!
//! Holds the procedural galaxy parameters alongside render, camera and debug
//! settings. Settings persist to disk as RON, accept CLI overrides via clap,
//! and are validated before any generation starts.

mod cli;
mod config;
mod error;
mod galaxy;

pub use cli::CliArgs;
pub use config::{CameraConfig, Config, DebugConfig, LodConfig, RenderConfig};
pub use error::ConfigError;
pub use galaxy::{ArmSpread, GalaxyConfig, MAX_TOTAL_SAMPLES, Spread};
