//! Multi-layer render compositor.
//!
//! A frame is described as data: an ordered list of passes, each drawing the
//! batches visible to one layer mask into one target (optionally followed by
//! a post effect on that target), and a final composite reading the layer
//! targets into the output. [`Compositor`] runs that description against a
//! [`RenderBackend`] and owns the resize and failure bookkeeping.

use std::fmt;

use galaxy_config::RenderConfig;

use crate::bloom::BloomConfig;
use crate::camera::Camera;
use crate::error::ResourceError;
use crate::layers::LayerMask;
use crate::scene::Scene;

/// Identifies one off-screen render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetId {
    Base,
    Bloom,
    Overlay,
    Output,
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetId::Base => "base",
            TargetId::Bloom => "bloom",
            TargetId::Overlay => "overlay",
            TargetId::Output => "output",
        };
        f.write_str(name)
    }
}

/// Pixel size of a target or viewport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Post-processing applied to a pass's target after it is drawn.
#[derive(Clone, Debug, PartialEq)]
pub enum PostEffect {
    Bloom(BloomConfig),
}

/// One isolated render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PassDescriptor {
    pub label: &'static str,
    /// Camera visibility while this pass draws.
    pub layers: LayerMask,
    pub target: TargetId,
    pub effect: Option<PostEffect>,
}

/// Final merge of the layer targets into the output.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeDescriptor {
    pub base: TargetId,
    /// Added on top of the base.
    pub bloom: TargetId,
    /// Alpha-blended over the base and bloom sum.
    pub overlay: TargetId,
    pub output: TargetId,
    /// Exposure applied before tonemapping.
    pub exposure: f32,
}

impl CompositeDescriptor {
    pub fn inputs(&self) -> [TargetId; 3] {
        [self.base, self.bloom, self.overlay]
    }
}

/// The full frame description.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineDescriptor {
    pub passes: Vec<PassDescriptor>,
    pub composite: CompositeDescriptor,
}

impl PipelineDescriptor {
    /// Bloom, then overlay, then base, then the composite.
    pub fn standard(render: &RenderConfig) -> Self {
        Self {
            passes: vec![
                PassDescriptor {
                    label: "bloom",
                    layers: LayerMask::BLOOM,
                    target: TargetId::Bloom,
                    effect: Some(PostEffect::Bloom(BloomConfig::from(render))),
                },
                PassDescriptor {
                    label: "overlay",
                    layers: LayerMask::OVERLAY,
                    target: TargetId::Overlay,
                    effect: None,
                },
                PassDescriptor {
                    label: "base",
                    layers: LayerMask::BASE,
                    target: TargetId::Base,
                    effect: None,
                },
            ],
            composite: CompositeDescriptor {
                base: TargetId::Base,
                bloom: TargetId::Bloom,
                overlay: TargetId::Overlay,
                output: TargetId::Output,
                exposure: render.exposure,
            },
        }
    }

    /// Reject descriptions that would read a target before it is written.
    ///
    /// Every pass writes a distinct target, the composite output is written by
    /// no pass, and each composite input is written by some pass.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let mut written: Vec<TargetId> = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            if pass.layers.is_empty() {
                return Err(ResourceError::InvalidPipeline(format!(
                    "pass '{}' selects no layers",
                    pass.label
                )));
            }
            if pass.target == self.composite.output {
                return Err(ResourceError::InvalidPipeline(format!(
                    "pass '{}' writes the composite output",
                    pass.label
                )));
            }
            if written.contains(&pass.target) {
                return Err(ResourceError::InvalidPipeline(format!(
                    "{} target is written by more than one pass",
                    pass.target
                )));
            }
            written.push(pass.target);
        }
        for input in self.composite.inputs() {
            if !written.contains(&input) {
                return Err(ResourceError::InvalidPipeline(format!(
                    "composite reads {input} target, which no pass writes"
                )));
            }
        }
        Ok(())
    }

    /// Every target the description touches: pass targets in order, then the output.
    pub fn targets(&self) -> Vec<TargetId> {
        self.passes
            .iter()
            .map(|p| p.target)
            .chain(std::iter::once(self.composite.output))
            .collect()
    }
}

/// What the compositor needs from a GPU (or a test double).
pub trait RenderBackend {
    /// Allocate a target at `extent`.
    fn create_target(&mut self, target: TargetId, extent: Extent) -> Result<(), ResourceError>;

    /// Reallocate an existing target at `extent`, even if its size is
    /// unchanged.
    fn resize_target(&mut self, target: TargetId, extent: Extent) -> Result<(), ResourceError>;

    /// Current extent of a target, or `None` if it does not exist.
    fn target_extent(&self, target: TargetId) -> Option<Extent>;

    /// Clear `target` and draw every batch visible to `camera.layers` into it.
    fn render_layers(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        target: TargetId,
    ) -> Result<(), ResourceError>;

    /// Apply a post effect to `target` in place.
    fn apply_effect(&mut self, effect: &PostEffect, target: TargetId)
    -> Result<(), ResourceError>;

    /// Merge the layer targets into the output.
    fn composite(&mut self, composite: &CompositeDescriptor) -> Result<(), ResourceError>;
}

/// Progress through the current (or last) frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    /// Drawing pass `n` of the descriptor.
    Pass(usize),
    /// Running pass `n`'s post effect.
    Effect(usize),
    Composite,
    Complete,
    Failed,
}

/// Runs a [`PipelineDescriptor`] once per frame.
pub struct Compositor<B: RenderBackend> {
    backend: B,
    descriptor: PipelineDescriptor,
    viewport: Extent,
    broken: bool,
    stage: FrameStage,
    frames: u64,
}

impl<B: RenderBackend> Compositor<B> {
    /// Validate the description and allocate every target at `viewport`.
    pub fn new(
        mut backend: B,
        descriptor: PipelineDescriptor,
        viewport: Extent,
    ) -> Result<Self, ResourceError> {
        descriptor.validate()?;
        for target in descriptor.targets() {
            backend.create_target(target, viewport)?;
        }
        log::info!(
            "Compositor ready: {} passes at {viewport}",
            descriptor.passes.len()
        );
        Ok(Self {
            backend,
            descriptor,
            viewport,
            broken: false,
            stage: FrameStage::Idle,
            frames: 0,
        })
    }

    /// Resize every target to `extent`.
    ///
    /// If any target fails, the compositor stays broken and refuses to render
    /// until a later resize succeeds for all of them.
    pub fn resize(&mut self, extent: Extent) -> Result<(), ResourceError> {
        if extent == self.viewport && !self.broken {
            return Ok(());
        }
        log::debug!("Resizing compositor {} -> {extent}", self.viewport);
        self.broken = true;
        self.viewport = extent;
        for target in self.descriptor.targets() {
            if let Err(err) = self.backend.resize_target(target, extent) {
                log::error!("Resize of {target} target failed: {err}");
                return Err(err);
            }
        }
        self.broken = false;
        Ok(())
    }

    /// Render one frame: every pass in order, then the composite.
    ///
    /// `camera.layers` is set for each pass and restored afterwards. Any
    /// failure leaves the compositor broken; it is never retried with the
    /// same state.
    pub fn render_frame(&mut self, scene: &Scene, camera: &mut Camera) -> Result<(), ResourceError> {
        if self.broken {
            self.stage = FrameStage::Failed;
            return Err(ResourceError::Broken);
        }
        camera.set_aspect_ratio(self.viewport.width as f32, self.viewport.height as f32);
        let saved_layers = camera.layers;
        let result = self.run_passes(scene, camera);
        camera.layers = saved_layers;
        match result {
            Ok(()) => {
                self.stage = FrameStage::Complete;
                self.frames += 1;
                Ok(())
            }
            Err(err) => {
                log::error!("Frame {} failed at {:?}: {err}", self.frames, self.stage);
                self.stage = FrameStage::Failed;
                self.broken = true;
                Err(err)
            }
        }
    }

    fn run_passes(&mut self, scene: &Scene, camera: &mut Camera) -> Result<(), ResourceError> {
        self.check_extents()?;
        for (index, pass) in self.descriptor.passes.iter().enumerate() {
            self.stage = FrameStage::Pass(index);
            camera.layers = pass.layers;
            self.backend.render_layers(scene, camera, pass.target)?;
            if let Some(effect) = &pass.effect {
                self.stage = FrameStage::Effect(index);
                self.backend.apply_effect(effect, pass.target)?;
            }
        }
        self.stage = FrameStage::Composite;
        self.backend.composite(&self.descriptor.composite)
    }

    fn check_extents(&self) -> Result<(), ResourceError> {
        for target in self.descriptor.targets() {
            let actual = self
                .backend
                .target_extent(target)
                .ok_or(ResourceError::MissingTarget(target))?;
            if actual != self.viewport {
                return Err(ResourceError::StaleTarget {
                    target,
                    expected: self.viewport,
                    actual,
                });
            }
        }
        Ok(())
    }

    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Frames completed successfully.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
