//! Procedural galaxy parameters.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Independent x/y spread (standard deviation) of a population, in world units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Spread {
    pub x: f32,
    pub y: f32,
}

impl Spread {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Spread and mean offset of the spiral-arm population.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArmSpread {
    pub x: f32,
    pub y: f32,
    pub mean_x: f32,
    pub mean_y: f32,
}

/// Immutable parameter set for one generated galaxy.
///
/// The haze population size is derived from `star_count * haze_ratio` and is
/// never stored; see [`GalaxyConfig::haze_count`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GalaxyConfig {
    /// Number of stars across the core, outer-core and arm populations.
    pub star_count: u32,
    /// Number of spiral arms. Zero disables the arm population.
    pub arm_count: u32,
    /// Disk thickness; scales every z distribution.
    pub thickness: f32,
    /// Core population spread.
    pub core: Spread,
    /// Outer-core population spread.
    pub outer_core: Spread,
    /// Spiral-arm population spread and mean.
    pub arm: ArmSpread,
    /// Spiral pitch factor. Zero keeps arms as straight radial wedges.
    pub spiral: f32,
    /// Haze points generated per star.
    pub haze_ratio: f32,
}

impl Default for GalaxyConfig {
    fn default() -> Self {
        Self {
            star_count: 1000,
            arm_count: 1,
            thickness: 8.0,
            core: Spread::new(22.0, 22.0),
            outer_core: Spread::new(50.0, 50.0),
            arm: ArmSpread::default(),
            spiral: 0.0,
            haze_ratio: 2.0,
        }
    }
}

/// Upper bound on stars plus haze points a single config may request.
pub const MAX_TOTAL_SAMPLES: usize = 1 << 26;

impl GalaxyConfig {
    /// Number of haze points: `round(star_count * haze_ratio)`, saturating at
    /// `usize::MAX`. [`validate`](Self::validate) caps it far below that.
    pub fn haze_count(&self) -> usize {
        (self.star_count as f64 * f64::from(self.haze_ratio)).round() as usize
    }

    /// Total number of samples a generator produces for this config, or
    /// `None` when the sum does not fit in `usize`.
    pub fn total_samples(&self) -> Option<usize> {
        (self.star_count as usize).checked_add(self.haze_count())
    }

    /// Check every invariant. Generation must not start on an invalid config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("thickness", self.thickness)?;
        non_negative("core.x", self.core.x)?;
        non_negative("core.y", self.core.y)?;
        non_negative("outer_core.x", self.outer_core.x)?;
        non_negative("outer_core.y", self.outer_core.y)?;
        non_negative("arm.x", self.arm.x)?;
        non_negative("arm.y", self.arm.y)?;
        finite("arm.mean_x", self.arm.mean_x)?;
        finite("arm.mean_y", self.arm.mean_y)?;
        finite("spiral", self.spiral)?;
        non_negative("haze_ratio", self.haze_ratio)?;
        match self.total_samples() {
            Some(total) if total <= MAX_TOTAL_SAMPLES => Ok(()),
            _ => Err(ConfigError::Invalid {
                field: if self.star_count as usize > MAX_TOTAL_SAMPLES {
                    "star_count"
                } else {
                    "haze_ratio"
                },
                reason: format!(
                    "{} stars with haze ratio {} exceed {MAX_TOTAL_SAMPLES} samples",
                    self.star_count, self.haze_ratio
                ),
            }),
        }
    }
}

fn finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be finite, got {value}"),
        })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must be >= 0, got {value}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_shipped_parameters() {
        let config = GalaxyConfig::default();
        assert_eq!(config.star_count, 1000);
        assert_eq!(config.arm_count, 1);
        assert_eq!(config.thickness, 8.0);
        assert_eq!(config.core, Spread::new(22.0, 22.0));
        assert_eq!(config.outer_core, Spread::new(50.0, 50.0));
        assert_eq!(config.spiral, 0.0);
        assert_eq!(config.haze_ratio, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_haze_count_is_rounded_product() {
        let mut config = GalaxyConfig::default();
        assert_eq!(config.haze_count(), 2000);
        assert_eq!(config.total_samples(), Some(3000));

        config.star_count = 3;
        config.haze_ratio = 0.5;
        assert_eq!(config.haze_count(), 2); // 1.5 rounds away from zero

        config.star_count = 0;
        assert_eq!(config.haze_count(), 0);
        assert_eq!(config.total_samples(), Some(0));
    }

    #[test]
    fn test_negative_distance_is_rejected() {
        let config = GalaxyConfig {
            core: Spread::new(-1.0, 22.0),
            ..GalaxyConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "core.x"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_haze_ratio_is_rejected() {
        let config = GalaxyConfig {
            haze_ratio: -0.1,
            ..GalaxyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "haze_ratio",
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let config = GalaxyConfig {
            spiral: f32::NAN,
            ..GalaxyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GalaxyConfig {
            thickness: f32::INFINITY,
            ..GalaxyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_spiral_and_arm_mean_are_valid() {
        let config = GalaxyConfig {
            spiral: -2.0,
            arm: ArmSpread {
                mean_x: -10.0,
                ..ArmSpread::default()
            },
            ..GalaxyConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_haze_ratio_is_rejected() {
        let config = GalaxyConfig {
            haze_ratio: 1e30,
            ..GalaxyConfig::default()
        };
        assert_eq!(config.haze_count(), usize::MAX);
        assert_eq!(config.total_samples(), None);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "haze_ratio",
                ..
            })
        ));
    }

    #[test]
    fn test_sample_cap_is_inclusive() {
        let mut config = GalaxyConfig {
            star_count: 1 << 20,
            haze_ratio: 63.0,
            ..GalaxyConfig::default()
        };
        assert_eq!(config.total_samples(), Some(MAX_TOTAL_SAMPLES));
        assert!(config.validate().is_ok());

        config.haze_ratio = 64.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_star_count_alone_over_cap_blames_star_count() {
        let config = GalaxyConfig {
            star_count: MAX_TOTAL_SAMPLES as u32 + 1,
            haze_ratio: 0.0,
            ..GalaxyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "star_count",
                ..
            })
        ));
    }
}
