//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::galaxy::GalaxyConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Procedural galaxy parameters.
    pub galaxy: GalaxyConfig,
    /// Rendering settings.
    pub render: RenderConfig,
    /// Initial camera placement.
    pub camera: CameraConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Exposure applied before tonemapping in the composition pass.
    pub exposure: f32,
    /// Luminance above which pixels contribute to bloom.
    pub bloom_threshold: f32,
    /// Bloom intensity multiplier.
    pub bloom_strength: f32,
    /// Bloom tap radius multiplier.
    pub bloom_radius: f32,
    /// Number of bloom downsample iterations.
    pub bloom_iterations: u32,
    /// Star scaling versus camera distance.
    pub lod: LodConfig,
}

/// Distance-driven scale and opacity bounds for star batches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Smallest scale multiplier a batch may receive.
    pub min_scale: f32,
    /// Largest scale multiplier a batch may receive.
    pub max_scale: f32,
    /// Camera distance at which the scale multiplier is exactly 1.
    pub reference_distance: f32,
    /// Opacity cap for haze points.
    pub haze_max_opacity: f32,
    /// Distance at which haze reaches full opacity.
    pub haze_fade_distance: f32,
}

/// Initial camera placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Starting position in world units.
    pub position: [f32; 3],
    /// Point the camera looks at.
    pub target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Near clip plane.
    pub near: f32,
    /// Far clip plane.
    pub far: f32,
    /// Orbit speed around `target` about +Z, in degrees per second. Zero
    /// holds the camera still.
    pub orbit_degrees_per_second: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write JSON logs to the platform log directory.
    pub file_logging: bool,
}

// --- Default implementations ---

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            exposure: 0.5,
            bloom_threshold: 0.4,
            bloom_strength: 1.5,
            bloom_radius: 1.0,
            bloom_iterations: 5,
            lod: LodConfig::default(),
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.25,
            max_scale: 5.0,
            reference_distance: 250.0,
            haze_max_opacity: 0.2,
            haze_fade_distance: 625.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [200.0, 200.0, 0.0],
            target: [0.0, 0.0, 0.0],
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 5_000_000.0,
            orbit_degrees_per_second: 6.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

impl LodConfig {
    /// Check that the bounds describe a non-empty positive range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("render.lod.min_scale", self.min_scale),
            ("render.lod.max_scale", self.max_scale),
            ("render.lod.reference_distance", self.reference_distance),
            ("render.lod.haze_fade_distance", self.haze_fade_distance),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a positive finite number, got {value}"),
                });
            }
        }
        if self.min_scale > self.max_scale {
            return Err(ConfigError::Invalid {
                field: "render.lod.min_scale",
                reason: format!(
                    "min_scale {} exceeds max_scale {}",
                    self.min_scale, self.max_scale
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.haze_max_opacity) {
            return Err(ConfigError::Invalid {
                field: "render.lod.haze_max_opacity",
                reason: format!("must be within [0, 1], got {}", self.haze_max_opacity),
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload / Validate ---

impl Config {
    /// Validate every section that has invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.galaxy.validate()?;
        self.render.lod.validate()?;
        if !self.camera.orbit_degrees_per_second.is_finite() {
            return Err(ConfigError::Invalid {
                field: "camera.orbit_degrees_per_second",
                reason: "must be finite".to_string(),
            });
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Invalid {
                field: "render.width",
                reason: format!(
                    "viewport must be non-empty, got {}x{}",
                    self.render.width, self.render.height
                ),
            });
        }
        Ok(())
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("star_count: 1000"));
        assert!(ron_str.contains("haze_ratio: 2.0"));
        assert!(ron_str.contains("width: 1280"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(galaxy: (star_count: 50))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.galaxy.star_count, 50);
        assert_eq!(config.galaxy.arm_count, 1);
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.galaxy.arm_count = 4;
        config.galaxy.spiral = 1.5;
        config.render.width = 1920;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_inverted_lod_bounds_rejected() {
        let mut config = Config::default();
        config.render.lod.min_scale = 10.0;
        config.render.lod.max_scale = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "render.lod.min_scale",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_viewport_rejected() {
        let mut config = Config::default();
        config.render.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_galaxy_propagates() {
        let mut config = Config::default();
        config.galaxy.thickness = -8.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "thickness",
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_orbit_rejected() {
        let mut config = Config::default();
        config.camera.orbit_degrees_per_second = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "camera.orbit_degrees_per_second",
                ..
            })
        ));
    }
}
