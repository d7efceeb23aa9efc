//! Final composition: base + bloom, overlay alpha-blended on top, then
//! exposure and ACES tonemapping into the output target.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::bloom::{create_fullscreen_pipeline, create_linear_sampler};
use crate::targets::{OUTPUT_FORMAT, RenderTarget};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct CompositeParams {
    pub exposure: f32,
    pub _padding: [f32; 3],
}

pub const COMPOSITE_SHADER_SOURCE: &str = r#"
struct CompositeParams {
    exposure: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: CompositeParams;
@group(1) @binding(0) var base_tex: texture_2d<f32>;
@group(1) @binding(1) var bloom_tex: texture_2d<f32>;
@group(1) @binding(2) var overlay_tex: texture_2d<f32>;
@group(1) @binding(3) var layer_sampler: sampler;

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn aces(hdr: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return clamp((hdr * (a * hdr + b)) / (hdr * (c * hdr + d) + e), vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_composite(in: VertexOutput) -> @location(0) vec4<f32> {
    let base = textureSample(base_tex, layer_sampler, in.uv).rgb;
    let bloom = textureSample(bloom_tex, layer_sampler, in.uv).rgb;
    let overlay = textureSample(overlay_tex, layer_sampler, in.uv);
    // Overlay is premultiplied.
    let color = (base + bloom) * (1.0 - overlay.a) + overlay.rgb;
    return vec4<f32>(aces(color * params.exposure), 1.0);
}
"#;

/// Merges the three layer targets into the output target.
pub struct CompositePipeline {
    pipeline: wgpu::RenderPipeline,
    layers_bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params: CompositeParams,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
}

impl CompositePipeline {
    pub fn new(device: &wgpu::Device, exposure: f32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("composite-shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITE_SHADER_SOURCE.into()),
        });

        let params_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite-params-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(16),
                },
                count: None,
            }],
        });

        let layer_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let layers_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite-layers-bgl"),
            entries: &[
                layer_entry(0),
                layer_entry(1),
                layer_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite-layout"),
            bind_group_layouts: &[&params_bgl, &layers_bgl],
            immediate_size: 0,
        });
        let pipeline = create_fullscreen_pipeline(
            device,
            &shader,
            &layout,
            "fs_composite",
            OUTPUT_FORMAT,
            None,
            "composite",
        );

        let params = CompositeParams {
            exposure,
            _padding: [0.0; 3],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("composite-params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite-params-bg"),
            layout: &params_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        Self {
            pipeline,
            layers_bgl,
            sampler: create_linear_sampler(device, "composite-sampler"),
            params,
            params_buffer,
            params_bind_group,
        }
    }

    pub fn set_exposure(&mut self, queue: &wgpu::Queue, exposure: f32) {
        if self.params.exposure == exposure {
            return;
        }
        self.params.exposure = exposure;
        queue.write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[self.params]));
    }

    /// Draw the composite into `output`. The layer bind group is rebuilt every
    /// call since targets may have been reallocated by a resize.
    pub fn execute(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        base: &RenderTarget,
        bloom: &RenderTarget,
        overlay: &RenderTarget,
        output: &RenderTarget,
    ) {
        let layers_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite-layers-bg"),
            layout: &self.layers_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&base.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&bloom.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&overlay.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &output.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.params_bind_group, &[]);
        pass.set_bind_group(1, &layers_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_uniform_size() {
        assert_eq!(std::mem::size_of::<CompositeParams>(), 16);
    }

    #[test]
    fn test_shader_reads_all_three_layers() {
        for name in ["base_tex", "bloom_tex", "overlay_tex"] {
            assert!(COMPOSITE_SHADER_SOURCE.contains(&format!("textureSample({name}")));
        }
    }
}
