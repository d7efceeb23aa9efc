//! Population tags and the stellar classes that drive star size and color.

use rand::Rng;

use crate::color::{blackbody_to_rgb, tinted};

/// Which part of the galaxy a sample was drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Population {
    Core,
    OuterCore,
    Arm,
    Haze,
}

impl Population {
    pub const ALL: [Population; 4] = [
        Population::Core,
        Population::OuterCore,
        Population::Arm,
        Population::Haze,
    ];

    /// Multiplicative tint applied to a star's temperature color.
    pub fn tint(self) -> [f32; 3] {
        match self {
            Population::Core => [1.0, 0.92, 0.78],
            Population::OuterCore => [1.0, 1.0, 1.0],
            Population::Arm => [0.82, 0.9, 1.0],
            Population::Haze => [0.45, 0.55, 0.85],
        }
    }

    /// Final color for a sample of this population.
    ///
    /// Stars combine their class temperature with the population tint; haze
    /// ignores the class and always uses its dim diffuse tint.
    pub fn color(self, class: Option<SpectralClass>) -> [f32; 3] {
        match (self, class) {
            (Population::Haze, _) | (_, None) => self.tint(),
            (_, Some(class)) => tinted(blackbody_to_rgb(class.temperature_k()), self.tint()),
        }
    }

    pub fn is_haze(self) -> bool {
        self == Population::Haze
    }
}

/// Morgan–Keenan spectral class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpectralClass {
    O,
    B,
    A,
    F,
    G,
    K,
    M,
}

/// Relative frequencies, coolest first, matching [`SpectralClass::BY_FREQUENCY`].
const CLASS_WEIGHTS: [f64; 7] = [76.45, 12.1, 7.6, 3.0, 0.6, 0.13, 0.0001];

impl SpectralClass {
    /// Classes ordered as in `CLASS_WEIGHTS`.
    pub const BY_FREQUENCY: [SpectralClass; 7] = [
        SpectralClass::M,
        SpectralClass::K,
        SpectralClass::G,
        SpectralClass::F,
        SpectralClass::A,
        SpectralClass::B,
        SpectralClass::O,
    ];

    /// Effective surface temperature used for the color ramp.
    pub fn temperature_k(self) -> f32 {
        match self {
            SpectralClass::O => 35_000.0,
            SpectralClass::B => 20_000.0,
            SpectralClass::A => 8_600.0,
            SpectralClass::F => 6_750.0,
            SpectralClass::G => 5_800.0,
            SpectralClass::K => 4_500.0,
            SpectralClass::M => 3_200.0,
        }
    }

    /// Base point size before LOD scaling.
    pub fn base_size(self) -> f32 {
        match self {
            SpectralClass::O => 3.5,
            SpectralClass::B => 2.5,
            SpectralClass::A => 2.0,
            SpectralClass::F => 1.48,
            SpectralClass::G => 1.15,
            SpectralClass::K | SpectralClass::M => 0.7,
        }
    }

    /// Hot classes glow: they are drawn in the bloom layer as well as the base.
    pub fn is_bright(self) -> bool {
        self.temperature_k() >= SpectralClass::G.temperature_k()
    }

    /// Pick a class by relative frequency.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> SpectralClass {
        let total: f64 = CLASS_WEIGHTS.iter().sum();
        let mut roll = rng.random::<f64>() * total;
        for (class, weight) in Self::BY_FREQUENCY.iter().zip(CLASS_WEIGHTS) {
            if roll < weight {
                return *class;
            }
            roll -= weight;
        }
        SpectralClass::M
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_every_population_has_valid_color() {
        for population in Population::ALL {
            for class in SpectralClass::BY_FREQUENCY.map(Some).into_iter().chain([None]) {
                let color = population.color(class);
                assert!(
                    color.iter().all(|c| (0.0..=1.0).contains(c)),
                    "{population:?}/{class:?} produced {color:?}"
                );
            }
        }
    }

    #[test]
    fn test_haze_color_ignores_class() {
        assert_eq!(
            Population::Haze.color(Some(SpectralClass::O)),
            Population::Haze.color(None)
        );
    }

    #[test]
    fn test_arm_stars_are_bluer_than_core_stars() {
        let core = Population::Core.color(Some(SpectralClass::G));
        let arm = Population::Arm.color(Some(SpectralClass::G));
        assert!(arm[2] / arm[0] > core[2] / core[0]);
    }

    #[test]
    fn test_class_distribution_skews_cool() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let classes: Vec<_> = (0..10_000).map(|_| SpectralClass::sample(&mut rng)).collect();
        let m_count = classes.iter().filter(|c| **c == SpectralClass::M).count();
        let bright = classes.iter().filter(|c| c.is_bright()).count();
        assert!(m_count > 7000, "expected ~76% M stars, got {m_count}");
        assert!(bright < m_count / 3);
    }

    #[test]
    fn test_hotter_classes_are_larger() {
        let sizes: Vec<f32> = SpectralClass::BY_FREQUENCY
            .iter()
            .map(|c| c.base_size())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_brightness_threshold() {
        assert!(SpectralClass::O.is_bright());
        assert!(SpectralClass::G.is_bright());
        assert!(!SpectralClass::K.is_bright());
        assert!(!SpectralClass::M.is_bright());
    }
}
