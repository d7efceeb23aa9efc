//! Render layers and the bitmask that routes batches into passes.
//!
//! A batch carries a [`LayerMask`]; each pass sets the camera's mask to the
//! layers it draws, and a batch is drawn when the two intersect.

use std::fmt;

/// One of the three isolated render layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Base = 0,
    Bloom = 1,
    Overlay = 2,
}

impl RenderLayer {
    pub const ALL: [RenderLayer; 3] = [RenderLayer::Base, RenderLayer::Bloom, RenderLayer::Overlay];

    /// Layer for a bit index. Unknown indices fail closed to [`RenderLayer::Base`].
    pub fn from_index(index: u32) -> RenderLayer {
        match index {
            1 => RenderLayer::Bloom,
            2 => RenderLayer::Overlay,
            _ => RenderLayer::Base,
        }
    }

    /// Layer for a tag name, case-insensitive. Unknown names fail closed to
    /// [`RenderLayer::Base`].
    pub fn from_name(name: &str) -> RenderLayer {
        match name.trim().to_ascii_lowercase().as_str() {
            "bloom" => RenderLayer::Bloom,
            "overlay" => RenderLayer::Overlay,
            "base" => RenderLayer::Base,
            other => {
                log::debug!("Unknown render layer '{other}', routing to base");
                RenderLayer::Base
            }
        }
    }

    pub fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            RenderLayer::Base => "base",
            RenderLayer::Bloom => "bloom",
            RenderLayer::Overlay => "overlay",
        }
    }
}

impl fmt::Display for RenderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of render layers packed into a `u32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const BASE: LayerMask = LayerMask(1 << RenderLayer::Base as u32);
    pub const BLOOM: LayerMask = LayerMask(1 << RenderLayer::Bloom as u32);
    pub const OVERLAY: LayerMask = LayerMask(1 << RenderLayer::Overlay as u32);
    pub const ALL: LayerMask = LayerMask(Self::BASE.0 | Self::BLOOM.0 | Self::OVERLAY.0);

    pub fn from_layers(layers: &[RenderLayer]) -> LayerMask {
        LayerMask(layers.iter().fold(0, |bits, layer| bits | layer.bit()))
    }

    /// Selector for a raw tag set.
    ///
    /// Bits outside the three known layers are dropped. If nothing known is
    /// left the batch is routed to the base layer only.
    pub fn route(raw: u32) -> LayerMask {
        let known = raw & Self::ALL.0;
        if known == 0 {
            Self::BASE
        } else {
            LayerMask(known)
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, layer: RenderLayer) -> bool {
        self.0 & layer.bit() != 0
    }

    /// Whether a batch with mask `self` is visible to a camera selecting `other`.
    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn set(&mut self, layer: RenderLayer) {
        self.0 |= layer.bit();
    }

    pub fn layers(self) -> impl Iterator<Item = RenderLayer> {
        RenderLayer::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl From<RenderLayer> for LayerMask {
    fn from(layer: RenderLayer) -> Self {
        LayerMask(layer.bit())
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_index_fails_closed_to_base() {
        assert_eq!(RenderLayer::from_index(7), RenderLayer::Base);
        assert_eq!(RenderLayer::from_index(1), RenderLayer::Bloom);
        assert_eq!(RenderLayer::from_index(2), RenderLayer::Overlay);
    }

    #[test]
    fn test_names_round_trip_and_unknown_is_base() {
        for layer in RenderLayer::ALL {
            assert_eq!(RenderLayer::from_name(layer.name()), layer);
        }
        assert_eq!(RenderLayer::from_name(" BLOOM "), RenderLayer::Bloom);
        assert_eq!(RenderLayer::from_name("sparkle"), RenderLayer::Base);
    }

    #[test]
    fn test_route_drops_unknown_bits() {
        assert_eq!(LayerMask::route(0b1000_0010), LayerMask::BLOOM);
        assert_eq!(LayerMask::route(0b1000_0000), LayerMask::BASE);
        assert_eq!(LayerMask::route(0), LayerMask::BASE);
        assert_eq!(LayerMask::route(0b011), LayerMask::BASE | LayerMask::BLOOM);
    }

    #[test]
    fn test_bright_batch_is_visible_to_base_and_bloom_passes() {
        let bright = LayerMask::from_layers(&[RenderLayer::Base, RenderLayer::Bloom]);
        assert!(bright.intersects(LayerMask::BASE));
        assert!(bright.intersects(LayerMask::BLOOM));
        assert!(!bright.intersects(LayerMask::OVERLAY));
        assert_eq!(
            bright.layers().collect::<Vec<_>>(),
            vec![RenderLayer::Base, RenderLayer::Bloom]
        );
    }

    #[test]
    fn test_set_adds_layer() {
        let mut mask = LayerMask::NONE;
        assert!(mask.is_empty());
        mask.set(RenderLayer::Overlay);
        assert_eq!(mask, LayerMask::OVERLAY);
        assert_eq!(LayerMask::from(RenderLayer::Overlay).bits(), 0b100);
    }
}
