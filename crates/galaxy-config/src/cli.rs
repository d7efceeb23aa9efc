//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Galaxy renderer command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "galaxy", about = "Procedural galaxy renderer")]
pub struct CliArgs {
    /// Viewport width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Random seed for the distribution sampler.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Number of stars.
    #[arg(long)]
    pub stars: Option<u32>,

    /// Number of spiral arms.
    #[arg(long)]
    pub arms: Option<u32>,

    /// Spiral pitch factor.
    #[arg(long, allow_negative_numbers = true)]
    pub spiral: Option<f32>,

    /// Number of frames to render before exiting.
    #[arg(long, default_value_t = 120)]
    pub frames: u64,

    /// Write the last composed frame to this PNG file.
    #[arg(long)]
    pub screenshot: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.render.width = w;
        }
        if let Some(h) = args.height {
            self.render.height = h;
        }
        if let Some(stars) = args.stars {
            self.galaxy.star_count = stars;
        }
        if let Some(arms) = args.arms {
            self.galaxy.arm_count = arms;
        }
        if let Some(spiral) = args.spiral {
            self.galaxy.spiral = spiral;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            stars: Some(250),
            spiral: Some(-0.5),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.render.width, 1920);
        assert_eq!(config.galaxy.star_count, 250);
        assert_eq!(config.galaxy.spiral, -0.5);
        // Non-overridden fields retain defaults
        assert_eq!(config.render.height, 720);
        assert_eq!(config.galaxy.arm_count, 1);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::try_parse_from([
            "galaxy", "--arms", "4", "--spiral", "-1.5", "--seed", "7", "--frames", "3",
        ])
        .unwrap();
        assert_eq!(args.arms, Some(4));
        assert_eq!(args.spiral, Some(-1.5));
        assert_eq!(args.seed, 7);
        assert_eq!(args.frames, 3);
        assert!(args.screenshot.is_none());
    }
}
