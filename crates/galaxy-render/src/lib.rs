//! Layered star-field rendering: layer routing, the scene of star batches and
//! their distance-driven LOD, and the compositor that draws bloom, overlay and
//! base passes and merges them into one frame.

pub mod backend;
pub mod bloom;
pub mod camera;
pub mod composite;
pub mod compositor;
pub mod error;
pub mod layers;
pub mod scene;
pub mod stars;
pub mod starfield;
pub mod targets;

pub use backend::WgpuBackend;
pub use bloom::{BloomConfig, BloomPipeline};
pub use camera::Camera;
pub use compositor::{
    CompositeDescriptor, Compositor, Extent, FrameStage, PassDescriptor, PipelineDescriptor,
    PostEffect, RenderBackend, TargetId,
};
pub use error::ResourceError;
pub use layers::{LayerMask, RenderLayer};
pub use scene::{Batch, BatchId, BlendMode, Scene, StarInstance};
pub use starfield::{StarField, haze_opacity_for_distance, layers_for, scale_for_distance};
pub use targets::{LAYER_FORMAT, OUTPUT_FORMAT};

/// Create a test GPU device and queue. Returns `None` if no GPU is available.
#[cfg(test)]
pub(crate) fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("galaxy-render-test"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: Default::default(),
                ..Default::default()
            })
            .await
            .ok()
    })
}
