//! Star field builder: groups generated samples into layer-tagged batches and
//! keeps their size and opacity in step with the camera distance.

use std::rc::{Rc, Weak};

use galaxy_config::LodConfig;
use galaxy_gen::StarSample;
use glam::Vec3;

use crate::camera::Camera;
use crate::layers::LayerMask;
use crate::scene::{Batch, BatchId, BlendMode, Scene};

/// Layer set for a single sample.
///
/// Haze only feeds the overlay. Hot stars glow, so they are drawn into the
/// bloom layer as well as the base.
pub fn layers_for(sample: &StarSample) -> LayerMask {
    if sample.population.is_haze() {
        LayerMask::OVERLAY
    } else if sample.class.is_some_and(|c| c.is_bright()) {
        LayerMask::BASE | LayerMask::BLOOM
    } else {
        LayerMask::BASE
    }
}

/// Size multiplier at a camera distance.
///
/// `reference_distance / distance`, clamped to the configured range. Zero
/// distance gives the maximum; infinite or NaN distance gives the minimum.
pub fn scale_for_distance(distance: f32, lod: &LodConfig) -> f32 {
    if distance.is_nan() {
        return lod.min_scale;
    }
    if distance <= 0.0 {
        return lod.max_scale;
    }
    (lod.reference_distance / distance).clamp(lod.min_scale, lod.max_scale)
}

/// Haze opacity at a camera distance. Haze fades out as the camera closes in.
pub fn haze_opacity_for_distance(distance: f32, lod: &LodConfig) -> f32 {
    if distance.is_nan() {
        return lod.haze_max_opacity;
    }
    let t = distance.max(0.0) / lod.haze_fade_distance;
    (lod.haze_max_opacity * t * t).clamp(0.0, lod.haze_max_opacity)
}

/// The batches built from one generated galaxy.
pub struct StarField {
    batches: Vec<Weak<Batch>>,
    /// Strong references held until the batches are attached to a scene.
    owned: Vec<Rc<Batch>>,
    lod: LodConfig,
    center: Vec3,
}

impl StarField {
    /// Partition samples by layer set. Empty partitions produce no batch.
    pub fn build(samples: Vec<StarSample>, lod: &LodConfig) -> Self {
        let mut groups: Vec<(LayerMask, Vec<StarSample>)> = Vec::new();
        for sample in samples {
            let mask = layers_for(&sample);
            match groups.iter_mut().find(|(m, _)| *m == mask) {
                Some((_, group)) => group.push(sample),
                None => groups.push((mask, vec![sample])),
            }
        }
        groups.sort_by_key(|(mask, _)| mask.bits());

        let owned: Vec<Rc<Batch>> = groups
            .into_iter()
            .map(|(mask, samples)| {
                let blend = if mask == LayerMask::OVERLAY {
                    BlendMode::Alpha
                } else {
                    BlendMode::Additive
                };
                log::debug!("Star batch {:?}: {} samples", mask, samples.len());
                Rc::new(Batch::new(mask, blend, samples))
            })
            .collect();

        Self {
            batches: owned.iter().map(Rc::downgrade).collect(),
            owned,
            lod: lod.clone(),
            center: Vec3::ZERO,
        }
    }

    /// Hand the batches to the scene. Only the first call has an effect.
    pub fn attach(&mut self, scene: &mut Scene) -> Vec<BatchId> {
        if self.owned.is_empty() {
            return Vec::new();
        }
        let ids: Vec<BatchId> = self.owned.drain(..).map(|b| scene.add(b)).collect();
        log::info!("Attached {} star batches to the scene", ids.len());
        ids
    }

    pub fn is_attached(&self) -> bool {
        self.owned.is_empty()
    }

    /// Recompute every live batch's scale (and haze opacity) from the camera's
    /// distance to the galaxy center. `None` leaves everything untouched.
    pub fn update_scale(&self, camera: Option<&Camera>) {
        let Some(camera) = camera else {
            return;
        };
        let distance = camera.distance_to(self.center);
        let scale = scale_for_distance(distance, &self.lod);
        let haze_opacity = haze_opacity_for_distance(distance, &self.lod);
        for batch in self.batches.iter().filter_map(Weak::upgrade) {
            batch.set_scale(scale);
            if batch.blend() == BlendMode::Alpha {
                batch.set_opacity(haze_opacity);
            }
        }
    }

    /// Batches still alive, whether owned here or by a scene.
    pub fn batches(&self) -> impl Iterator<Item = Rc<Batch>> + '_ {
        self.batches.iter().filter_map(Weak::upgrade)
    }

    pub fn lod(&self) -> &LodConfig {
        &self.lod
    }
}
