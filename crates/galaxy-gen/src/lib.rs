//! Procedural galaxy generation: seeded sampling of core, outer-core,
//! spiral-arm and haze populations into colored, sized star samples.

pub mod color;
pub mod generator;
pub mod population;
pub mod strategy;

pub use color::blackbody_to_rgb;
pub use generator::{GalaxyGenerator, PopulationCounts, StarSample};
pub use population::{Population, SpectralClass};
pub use strategy::{
    DiffuseHalo, DistributionStrategy, GaussianDisk, LogSpiral, Z_TRUNCATION_SIGMAS,
};
