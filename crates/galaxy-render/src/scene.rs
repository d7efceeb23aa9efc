//! Minimal scene graph: a flat set of shared star batches.
//!
//! The scene holds strong references; the star field that built the batches
//! keeps only weak back-references for its per-frame LOD update.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use galaxy_gen::StarSample;

use crate::layers::LayerMask;

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a batch for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    fn next() -> Self {
        BatchId(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// How a batch's points combine with what is already in its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Points add light; used for stars.
    Additive,
    /// Points cover what is behind them by their opacity; used for haze.
    Alpha,
}

/// Per-instance GPU data for one star billboard.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StarInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}

/// Samples that share a layer set, plus their LOD state.
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    layers: LayerMask,
    blend: BlendMode,
    samples: Vec<StarSample>,
    scale: Cell<f32>,
    opacity: Cell<f32>,
}

impl Batch {
    pub fn new(layers: LayerMask, blend: BlendMode, samples: Vec<StarSample>) -> Self {
        Self {
            id: BatchId::next(),
            layers,
            blend,
            samples,
            scale: Cell::new(1.0),
            opacity: Cell::new(1.0),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn layers(&self) -> LayerMask {
        self.layers
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn samples(&self) -> &[StarSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Current LOD size multiplier.
    pub fn scale(&self) -> f32 {
        self.scale.get()
    }

    pub fn set_scale(&self, scale: f32) {
        self.scale.set(scale);
    }

    /// Current opacity multiplier.
    pub fn opacity(&self) -> f32 {
        self.opacity.get()
    }

    pub fn set_opacity(&self, opacity: f32) {
        self.opacity.set(opacity);
    }

    /// Instance data for upload. Scale and opacity are applied on the GPU.
    pub fn instances(&self) -> Vec<StarInstance> {
        self.samples
            .iter()
            .map(|s| StarInstance {
                position: s.position.to_array(),
                size: s.size,
                color: [s.color[0], s.color[1], s.color[2], 1.0],
            })
            .collect()
    }
}

/// The set of batches a frame draws.
#[derive(Debug, Default)]
pub struct Scene {
    batches: Vec<Rc<Batch>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take shared ownership of a batch. Adding the same batch twice is ignored.
    pub fn add(&mut self, batch: Rc<Batch>) -> BatchId {
        let id = batch.id();
        if !self.contains(id) {
            self.batches.push(batch);
        }
        id
    }

    /// Drop the scene's reference to a batch, returning it if it was present.
    pub fn remove(&mut self, id: BatchId) -> Option<Rc<Batch>> {
        let index = self.batches.iter().position(|b| b.id() == id)?;
        Some(self.batches.remove(index))
    }

    pub fn contains(&self, id: BatchId) -> bool {
        self.batches.iter().any(|b| b.id() == id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Rc<Batch>> {
        self.batches.iter()
    }

    /// Batches drawn by a pass selecting `mask`, in insertion order.
    pub fn visible(&self, mask: LayerMask) -> impl Iterator<Item = &Rc<Batch>> {
        self.batches
            .iter()
            .filter(move |b| b.layers().intersects(mask))
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_gen::Population;
    use glam::Vec3;

    fn sample(x: f32) -> StarSample {
        StarSample {
            position: Vec3::new(x, 0.0, 0.0),
            color: [1.0, 0.5, 0.25],
            size: 2.0,
            population: Population::Core,
            class: None,
        }
    }

    #[test]
    fn test_batch_ids_are_unique() {
        let a = Batch::new(LayerMask::BASE, BlendMode::Additive, vec![]);
        let b = Batch::new(LayerMask::BASE, BlendMode::Additive, vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_add_is_idempotent_and_remove_returns_batch() {
        let mut scene = Scene::new();
        let batch = Rc::new(Batch::new(LayerMask::BASE, BlendMode::Additive, vec![sample(1.0)]));
        let id = scene.add(batch.clone());
        scene.add(batch.clone());
        assert_eq!(scene.len(), 1);
        assert_eq!(Rc::strong_count(&batch), 2);

        let removed = scene.remove(id).expect("batch should be present");
        assert_eq!(removed.id(), id);
        assert!(scene.is_empty());
        assert!(scene.remove(id).is_none());
    }

    #[test]
    fn test_visible_filters_by_mask() {
        let mut scene = Scene::new();
        let base = scene.add(Rc::new(Batch::new(LayerMask::BASE, BlendMode::Additive, vec![])));
        let bright = scene.add(Rc::new(Batch::new(
            LayerMask::BASE | LayerMask::BLOOM,
            BlendMode::Additive,
            vec![],
        )));
        let haze = scene.add(Rc::new(Batch::new(LayerMask::OVERLAY, BlendMode::Alpha, vec![])));

        let ids = |mask| scene.visible(mask).map(|b| b.id()).collect::<Vec<_>>();
        assert_eq!(ids(LayerMask::BASE), vec![base, bright]);
        assert_eq!(ids(LayerMask::BLOOM), vec![bright]);
        assert_eq!(ids(LayerMask::OVERLAY), vec![haze]);
    }

    #[test]
    fn test_instances_pack_samples() {
        let batch = Batch::new(LayerMask::BASE, BlendMode::Additive, vec![sample(3.0)]);
        let instances = batch.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].position, [3.0, 0.0, 0.0]);
        assert_eq!(instances[0].color, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(std::mem::size_of::<StarInstance>(), 32);
    }

    #[test]
    fn test_lod_state_is_shared_through_rc() {
        let batch = Rc::new(Batch::new(LayerMask::BASE, BlendMode::Additive, vec![]));
        let other = Rc::clone(&batch);
        batch.set_scale(0.5);
        batch.set_opacity(0.1);
        assert_eq!(other.scale(), 0.5);
        assert_eq!(other.opacity(), 0.1);
    }
}
