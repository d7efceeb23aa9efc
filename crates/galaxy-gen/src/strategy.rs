//! Spatial distribution strategies shared by every population.
//!
//! Each strategy turns a count and a random source into positions. The
//! generator only picks parameters; all sampling goes through
//! [`DistributionStrategy::sample`].

use glam::Vec3;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

/// Vertical draws are truncated at this many standard deviations, so no sample
/// leaves `|z| <= Z_TRUNCATION_SIGMAS * sigma_z`.
pub const Z_TRUNCATION_SIGMAS: f32 = 3.0;

/// A spatial distribution for one population.
pub trait DistributionStrategy {
    /// Draw `n` positions.
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Vec<Vec3>;
}

fn standard_normal(rng: &mut dyn RngCore) -> f32 {
    StandardNormal.sample(rng)
}

fn truncated_normal(rng: &mut dyn RngCore) -> f32 {
    standard_normal(rng).clamp(-Z_TRUNCATION_SIGMAS, Z_TRUNCATION_SIGMAS)
}

/// Independent Gaussians on x and y around a mean, truncated Gaussian on z.
///
/// A sigma of zero collapses that axis onto the mean.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianDisk {
    pub mean_x: f32,
    pub mean_y: f32,
    pub sigma_x: f32,
    pub sigma_y: f32,
    pub sigma_z: f32,
}

impl GaussianDisk {
    /// A disk centered on the origin.
    pub fn centered(sigma_x: f32, sigma_y: f32, sigma_z: f32) -> Self {
        Self {
            mean_x: 0.0,
            mean_y: 0.0,
            sigma_x,
            sigma_y,
            sigma_z,
        }
    }

    fn sample_one(&self, rng: &mut dyn RngCore) -> Vec3 {
        let x = self.mean_x + self.sigma_x * standard_normal(rng);
        let y = self.mean_y + self.sigma_y * standard_normal(rng);
        let z = self.sigma_z * truncated_normal(rng);
        Vec3::new(x, y, z)
    }
}

impl DistributionStrategy for GaussianDisk {
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Vec<Vec3> {
        (0..n).map(|_| self.sample_one(rng)).collect()
    }
}

/// One logarithmic spiral arm.
///
/// A Gaussian offset `(x, y)` is converted to polar `(r, phi)` and re-emitted
/// at angle `arm_angle + phi + spiral * r / scale`. With `spiral == 0` the arm
/// is a straight wedge rotated to `arm_angle`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogSpiral {
    /// Base angle of this arm, `2π * arm_index / arm_count`.
    pub arm_angle: f32,
    /// Pitch factor.
    pub spiral: f32,
    /// Radius normalization; the arm's x spread, or 1 when that is zero.
    pub scale: f32,
    /// Offset distribution before the spiral twist.
    pub spread: GaussianDisk,
}

impl LogSpiral {
    pub fn new(arm_index: u32, arm_count: u32, spiral: f32, spread: GaussianDisk) -> Self {
        let arm_angle = std::f32::consts::TAU * arm_index as f32 / arm_count.max(1) as f32;
        let scale = if spread.sigma_x > 0.0 {
            spread.sigma_x
        } else {
            1.0
        };
        Self {
            arm_angle,
            spiral,
            scale,
            spread,
        }
    }

    /// Twist a disk-space offset onto the arm.
    pub fn twist(&self, offset: Vec3) -> Vec3 {
        let r = offset.x.hypot(offset.y);
        let theta = self.arm_angle + offset.y.atan2(offset.x) + self.spiral * r / self.scale;
        Vec3::new(r * theta.cos(), r * theta.sin(), offset.z)
    }
}

impl DistributionStrategy for LogSpiral {
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Vec<Vec3> {
        (0..n)
            .map(|_| self.twist(self.spread.sample_one(rng)))
            .collect()
    }
}

/// Wide, centered halo used for ambient haze.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffuseHalo {
    pub sigma_x: f32,
    pub sigma_y: f32,
    pub sigma_z: f32,
}

impl DistributionStrategy for DiffuseHalo {
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Vec<Vec3> {
        GaussianDisk::centered(self.sigma_x, self.sigma_y, self.sigma_z).sample(n, rng)
    }
}
