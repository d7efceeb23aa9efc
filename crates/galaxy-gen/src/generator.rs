//! Seeded galaxy generation.
//!
//! [`GalaxyGenerator`] validates a [`GalaxyConfig`] once and then produces the
//! same sample sequence for the same seed on every call.

use galaxy_config::{ConfigError, GalaxyConfig};
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::population::{Population, SpectralClass};
use crate::strategy::{DiffuseHalo, DistributionStrategy, GaussianDisk, LogSpiral};

/// Haze spreads this much wider than the outer core.
const HAZE_SPREAD_FACTOR: f32 = 1.5;
/// Haze point size range; always smaller than the smallest star.
const HAZE_SIZE_RANGE: (f32, f32) = (0.3, 0.6);

/// One generated body.
#[derive(Clone, Debug, PartialEq)]
pub struct StarSample {
    /// World-space position.
    pub position: Vec3,
    /// Linear RGB in `[0, 1]`.
    pub color: [f32; 3],
    /// Base point size before LOD scaling.
    pub size: f32,
    pub population: Population,
    /// Spectral class; `None` for haze.
    pub class: Option<SpectralClass>,
}

/// How many samples each population receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopulationCounts {
    pub core: usize,
    pub outer_core: usize,
    /// One entry per arm.
    pub arms: Vec<usize>,
    pub haze: usize,
}

impl PopulationCounts {
    /// Split `star_count` across populations.
    ///
    /// Without arms the core takes half and the outer core the rest. With arms
    /// the core and outer core take a quarter each and the arms share the
    /// remainder, earlier arms taking one extra star when it does not divide
    /// evenly. Haze is `round(star_count * haze_ratio)` on top.
    pub fn for_config(config: &GalaxyConfig) -> Self {
        let stars = config.star_count as usize;
        let haze = config.haze_count();
        if config.arm_count == 0 {
            let core = stars / 2;
            return Self {
                core,
                outer_core: stars - core,
                arms: Vec::new(),
                haze,
            };
        }

        let core = stars / 4;
        let outer_core = stars / 4;
        let arm_total = stars - core - outer_core;
        let arm_count = config.arm_count as usize;
        let per_arm = arm_total / arm_count;
        let remainder = arm_total % arm_count;
        let arms = (0..arm_count)
            .map(|i| per_arm + usize::from(i < remainder))
            .collect();
        Self {
            core,
            outer_core,
            arms,
            haze,
        }
    }

    pub fn stars(&self) -> usize {
        self.core + self.outer_core + self.arms.iter().sum::<usize>()
    }

    /// Stars plus haze, or `None` on overflow.
    pub fn total(&self) -> Option<usize> {
        self.stars().checked_add(self.haze)
    }
}

/// Deterministic galaxy sampler.
#[derive(Clone, Debug)]
pub struct GalaxyGenerator {
    config: GalaxyConfig,
    seed: u64,
}

impl GalaxyGenerator {
    /// Validate `config` and bind it to `seed`. Invalid configs never reach
    /// [`generate`](Self::generate).
    pub fn new(config: GalaxyConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, seed })
    }

    pub fn config(&self) -> &GalaxyConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn counts(&self) -> PopulationCounts {
        PopulationCounts::for_config(&self.config)
    }

    /// Populations with samples whose x and y spreads are both zero. Their
    /// samples only differ in z, which is valid but rarely intended.
    pub fn degenerate_populations(&self) -> Vec<Population> {
        let counts = self.counts();
        let c = &self.config;
        let flat = |x: f32, y: f32| x == 0.0 && y == 0.0;
        [
            (Population::Core, counts.core, flat(c.core.x, c.core.y)),
            (
                Population::OuterCore,
                counts.outer_core,
                flat(c.outer_core.x, c.outer_core.y),
            ),
            (
                Population::Arm,
                counts.arms.iter().sum::<usize>(),
                flat(c.arm.x, c.arm.y),
            ),
            (
                Population::Haze,
                counts.haze,
                flat(c.outer_core.x, c.outer_core.y),
            ),
        ]
        .into_iter()
        .filter(|&(_, n, flat)| n > 0 && flat)
        .map(|(population, ..)| population)
        .collect()
    }

    /// Generate every sample: core, outer core, each arm in order, then haze.
    pub fn generate(&self) -> Vec<StarSample> {
        let counts = self.counts();
        for population in self.degenerate_populations() {
            log::warn!(
                "{population:?} spread is zero on both axes; its samples collapse onto a vertical line"
            );
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut samples = Vec::with_capacity(counts.total().unwrap_or_default());
        let c = &self.config;
        let half_thickness = c.thickness * 0.5;

        let core = GaussianDisk::centered(c.core.x, c.core.y, half_thickness);
        push_stars(&mut samples, Population::Core, &core, counts.core, &mut rng);

        let outer = GaussianDisk::centered(c.outer_core.x, c.outer_core.y, half_thickness);
        push_stars(
            &mut samples,
            Population::OuterCore,
            &outer,
            counts.outer_core,
            &mut rng,
        );

        let arm_spread = GaussianDisk {
            mean_x: c.arm.mean_x,
            mean_y: c.arm.mean_y,
            sigma_x: c.arm.x,
            sigma_y: c.arm.y,
            sigma_z: c.thickness,
        };
        for (index, &n) in counts.arms.iter().enumerate() {
            let arm = LogSpiral::new(index as u32, c.arm_count, c.spiral, arm_spread);
            push_stars(&mut samples, Population::Arm, &arm, n, &mut rng);
        }

        let haze = DiffuseHalo {
            sigma_x: c.outer_core.x * HAZE_SPREAD_FACTOR,
            sigma_y: c.outer_core.y * HAZE_SPREAD_FACTOR,
            sigma_z: c.thickness,
        };
        let positions = haze.sample(counts.haze, &mut rng);
        let color = Population::Haze.color(None);
        for position in positions {
            samples.push(StarSample {
                position,
                color,
                size: rng.random_range(HAZE_SIZE_RANGE.0..HAZE_SIZE_RANGE.1),
                population: Population::Haze,
                class: None,
            });
        }

        log::debug!(
            "Generated {} samples (core {}, outer {}, arms {:?}, haze {}) from seed {}",
            samples.len(),
            counts.core,
            counts.outer_core,
            counts.arms,
            counts.haze,
            self.seed
        );
        samples
    }
}

fn push_stars(
    samples: &mut Vec<StarSample>,
    population: Population,
    strategy: &dyn DistributionStrategy,
    n: usize,
    rng: &mut ChaCha8Rng,
) {
    for position in strategy.sample(n, rng) {
        let class = SpectralClass::sample(rng);
        samples.push(StarSample {
            position,
            color: population.color(Some(class)),
            size: class.base_size(),
            population,
            class: Some(class),
        });
    }
}
