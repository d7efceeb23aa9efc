//! wgpu implementation of [`RenderBackend`].
//!
//! Owns every render target, the star, bloom and composite pipelines, and a
//! per-batch cache of instance buffers keyed by [`BatchId`]. Each pass is
//! recorded into its own encoder and submitted before the next one starts.

use std::collections::HashMap;

use galaxy_config::RenderConfig;
use wgpu::util::DeviceExt;

use crate::bloom::{BloomConfig, BloomPipeline};
use crate::camera::Camera;
use crate::composite::CompositePipeline;
use crate::compositor::{CompositeDescriptor, Extent, PostEffect, RenderBackend, TargetId};
use crate::error::ResourceError;
use crate::scene::{Batch, BatchId, Scene};
use crate::stars::{BatchUniform, CameraUniform, StarPipeline, VERTICES_PER_STAR};
use crate::targets::{LAYER_FORMAT, RenderTarget, padded_bytes_per_row};

/// GPU copy of one batch.
struct GpuBatch {
    instances: wgpu::Buffer,
    count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    uniform: BatchUniform,
}

/// Headless wgpu backend rendering into off-screen targets.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    targets: HashMap<TargetId, RenderTarget>,
    stars: StarPipeline,
    bloom: BloomPipeline,
    composite: CompositePipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    batches: HashMap<BatchId, GpuBatch>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, render: &RenderConfig) -> Self {
        let stars = StarPipeline::new(&device, LAYER_FORMAT);
        let bloom = BloomPipeline::new(&device, LAYER_FORMAT, BloomConfig::from(render));
        let composite = CompositePipeline::new(&device, render.exposure);

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("star-camera-uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("star-camera-bg"),
            layout: &stars.camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            targets: HashMap::new(),
            stars,
            bloom,
            composite,
            camera_buffer,
            camera_bind_group,
            batches: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Number of batches with live GPU buffers.
    pub fn cached_batches(&self) -> usize {
        self.batches.len()
    }

    fn target(&self, id: TargetId) -> Result<&RenderTarget, ResourceError> {
        self.targets.get(&id).ok_or(ResourceError::MissingTarget(id))
    }

    fn upload_batch(&self, batch: &Batch) -> GpuBatch {
        let label = format!("star-batch-{}", batch.id().get());
        let instances = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytemuck::cast_slice(&batch.instances()),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let uniform = BatchUniform::new(batch.scale(), batch.opacity());
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("star-batch-uniform"),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("star-batch-bg"),
            layout: &self.stars.batch_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        GpuBatch {
            instances,
            count: batch.len() as u32,
            uniform_buffer,
            bind_group,
            uniform,
        }
    }

    /// Evict batches the scene no longer holds, upload new ones and push the
    /// latest scale and opacity.
    fn sync_batches(&mut self, scene: &Scene) {
        let before = self.batches.len();
        self.batches.retain(|id, _| scene.contains(*id));
        if self.batches.len() != before {
            log::debug!("Evicted {} star batches", before - self.batches.len());
        }

        for batch in scene.batches().filter(|b| !b.is_empty()) {
            if !self.batches.contains_key(&batch.id()) {
                let gpu = self.upload_batch(batch);
                self.batches.insert(batch.id(), gpu);
                continue;
            }
            if let Some(gpu) = self.batches.get_mut(&batch.id()) {
                let uniform = BatchUniform::new(batch.scale(), batch.opacity());
                if uniform != gpu.uniform {
                    self.queue
                        .write_buffer(&gpu.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
                    gpu.uniform = uniform;
                }
            }
        }
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Copy the output target back as tightly packed sRGB RGBA8 rows.
    pub fn read_output(&self) -> Result<(Extent, Vec<u8>), ResourceError> {
        let output = self.target(TargetId::Output)?;
        let Extent { width, height } = output.extent;
        let padded = padded_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output-readback"),
            size: u64::from(padded * height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.encoder("output-readback");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &output.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| ResourceError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| ResourceError::Readback(e.to_string()))?
            .map_err(|e| ResourceError::Readback(e.to_string()))?;

        let row_bytes = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded as usize).take(height as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        buffer.unmap();
        Ok((output.extent, pixels))
    }
}

impl RenderBackend for WgpuBackend {
    fn create_target(&mut self, target: TargetId, extent: Extent) -> Result<(), ResourceError> {
        let render_target = RenderTarget::new(&self.device, target, extent)?;
        self.targets.insert(target, render_target);
        Ok(())
    }

    fn resize_target(&mut self, target: TargetId, extent: Extent) -> Result<(), ResourceError> {
        self.create_target(target, extent)
    }

    fn target_extent(&self, target: TargetId) -> Option<Extent> {
        self.targets.get(&target).map(|t| t.extent)
    }

    fn render_layers(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        target: TargetId,
    ) -> Result<(), ResourceError> {
        self.sync_batches(scene);
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[camera.to_uniform()]),
        );

        let render_target = self.target(target)?;
        let mut encoder = self.encoder("layer-pass");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("layer-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &render_target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            for batch in scene.visible(camera.layers) {
                let Some(gpu) = self.batches.get(&batch.id()) else {
                    continue;
                };
                pass.set_pipeline(self.stars.pipeline(batch.blend()));
                pass.set_bind_group(1, &gpu.bind_group, &[]);
                pass.set_vertex_buffer(0, gpu.instances.slice(..));
                pass.draw(0..VERTICES_PER_STAR, 0..gpu.count);
            }
        }
        self.submit(encoder);
        Ok(())
    }

    fn apply_effect(&mut self, effect: &PostEffect, target: TargetId) -> Result<(), ResourceError> {
        match effect {
            PostEffect::Bloom(config) => {
                self.bloom.update_config(&self.queue, config);
                let render_target = self
                    .targets
                    .get(&target)
                    .ok_or(ResourceError::MissingTarget(target))?;
                let mut encoder = self
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("bloom-effect"),
                    });
                self.bloom
                    .execute(&self.device, &mut encoder, render_target)?;
                self.queue.submit(std::iter::once(encoder.finish()));
            }
        }
        Ok(())
    }

    fn composite(&mut self, composite: &CompositeDescriptor) -> Result<(), ResourceError> {
        self.composite.set_exposure(&self.queue, composite.exposure);
        let base = self.target(composite.base)?;
        let bloom = self.target(composite.bloom)?;
        let overlay = self.target(composite.overlay)?;
        let output = self.target(composite.output)?;
        let mut encoder = self.encoder("composite");
        self.composite
            .execute(&self.device, &mut encoder, base, bloom, overlay, output);
        self.submit(encoder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Compositor, PipelineDescriptor};
    use crate::starfield::StarField;
    use galaxy_config::{CameraConfig, GalaxyConfig};
    use galaxy_gen::GalaxyGenerator;

    fn backend() -> Option<WgpuBackend> {
        let (device, queue) = crate::test_device()?;
        Some(WgpuBackend::new(device, queue, &RenderConfig::default()))
    }

    #[test]
    fn test_zero_extent_target_fails() {
        let Some(mut backend) = backend() else {
            return;
        };
        let err = backend
            .create_target(TargetId::Base, Extent::new(0, 0))
            .unwrap_err();
        assert!(matches!(err, ResourceError::Allocation { .. }));
        assert!(backend.target_extent(TargetId::Base).is_none());
    }

    #[test]
    fn test_oversized_target_fails() {
        let Some(mut backend) = backend() else {
            return;
        };
        let max = backend.device().limits().max_texture_dimension_2d;
        assert!(
            backend
                .create_target(TargetId::Overlay, Extent::new(max + 1, 4))
                .is_err()
        );
    }

    #[test]
    fn test_readback_without_output_reports_missing_target() {
        let Some(backend) = backend() else {
            return;
        };
        assert!(matches!(
            backend.read_output(),
            Err(ResourceError::MissingTarget(TargetId::Output))
        ));
    }

    #[test]
    fn test_galaxy_frame_renders_and_reads_back() {
        let Some(backend) = backend() else {
            return;
        };
        let render = RenderConfig::default();
        let viewport = Extent::new(128, 96);
        let mut compositor =
            Compositor::new(backend, PipelineDescriptor::standard(&render), viewport).unwrap();

        let samples = GalaxyGenerator::new(GalaxyConfig::default(), 1)
            .unwrap()
            .generate();
        let mut scene = Scene::new();
        let mut field = StarField::build(samples, &render.lod);
        field.attach(&mut scene);

        let close = CameraConfig {
            position: [80.0, 80.0, 40.0],
            ..CameraConfig::default()
        };
        let mut camera = Camera::from_config(&close, viewport.aspect_ratio());
        field.update_scale(Some(&camera));
        compositor.render_frame(&scene, &mut camera).unwrap();
        assert_eq!(compositor.backend().cached_batches(), scene.len());

        let (extent, pixels) = compositor.backend().read_output().unwrap();
        assert_eq!(extent, viewport);
        assert_eq!(pixels.len(), 128 * 96 * 4);
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
        assert!(pixels.chunks_exact(4).any(|p| p[0] > 0 || p[1] > 0 || p[2] > 0));

        compositor.resize(Extent::new(32, 32)).unwrap();
        compositor.render_frame(&scene, &mut camera).unwrap();
        let (extent, pixels) = compositor.backend().read_output().unwrap();
        assert_eq!(extent, Extent::new(32, 32));
        assert_eq!(pixels.len(), 32 * 32 * 4);
    }

    #[test]
    fn test_removed_batches_are_evicted() {
        let Some(backend) = backend() else {
            return;
        };
        let render = RenderConfig::default();
        let mut compositor =
            Compositor::new(backend, PipelineDescriptor::standard(&render), Extent::new(16, 16))
                .unwrap();
        let samples = GalaxyGenerator::new(GalaxyConfig::default(), 2)
            .unwrap()
            .generate();
        let mut scene = Scene::new();
        let ids = StarField::build(samples, &render.lod).attach(&mut scene);
        let mut camera = Camera::default();
        compositor.render_frame(&scene, &mut camera).unwrap();
        let cached = compositor.backend().cached_batches();

        scene.remove(ids[0]);
        compositor.render_frame(&scene, &mut camera).unwrap();
        assert_eq!(compositor.backend().cached_batches(), cached - 1);
    }
}
