//! Instanced billboard pipeline for star and haze points.
//!
//! Each sample is one instance; the vertex shader expands it into a
//! camera-facing quad of half-size `size * batch.scale` along the camera's
//! right and up axes. No vertex buffer is needed for the quad corners.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

use crate::scene::{BlendMode, StarInstance};

/// Camera data the billboard shader needs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub right: [f32; 4],
    pub up: [f32; 4],
}

/// Per-batch LOD state.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BatchUniform {
    pub scale: f32,
    pub opacity: f32,
    pub _padding: [f32; 2],
}

impl BatchUniform {
    pub fn new(scale: f32, opacity: f32) -> Self {
        Self {
            scale,
            opacity,
            _padding: [0.0; 2],
        }
    }
}

impl StarInstance {
    /// Vertex buffer layout for instanced rendering.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<StarInstance>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &[
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: 0,
                shader_location: 0,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32,
                offset: 12,
                shader_location: 1,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: 16,
                shader_location: 2,
            },
        ],
    };
}

/// Quad corners drawn per instance (two triangles).
pub const VERTICES_PER_STAR: u32 = 6;

pub const STAR_SHADER_SOURCE: &str = r#"
struct CameraUniform {
    view_proj: mat4x4<f32>,
    right: vec4<f32>,
    up: vec4<f32>,
};

struct BatchUniform {
    scale: f32,
    opacity: f32,
    _padding: vec2<f32>,
};

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var<uniform> batch: BatchUniform;

struct InstanceInput {
    @location(0) center: vec3<f32>,
    @location(1) size: f32,
    @location(2) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
};

@vertex
fn vs_star(@builtin(vertex_index) idx: u32, in: InstanceInput) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0), vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, 1.0), vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[idx];
    let half_size = in.size * batch.scale;
    let world = in.center
        + camera.right.xyz * corner.x * half_size
        + camera.up.xyz * corner.y * half_size;

    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(world, 1.0);
    out.uv = corner;
    out.color = vec4<f32>(in.color.rgb, in.color.a * batch.opacity);
    return out;
}

fn falloff(uv: vec2<f32>) -> f32 {
    let f = max(1.0 - dot(uv, uv), 0.0);
    return f * f;
}

// Premultiplied output: the additive pipeline sums it, the alpha pipeline
// composites it so the overlay target carries coverage in alpha.
@fragment
fn fs_point(in: VertexOutput) -> @location(0) vec4<f32> {
    if dot(in.uv, in.uv) > 1.0 {
        discard;
    }
    let a = falloff(in.uv) * in.color.a;
    return vec4<f32>(in.color.rgb * a, a);
}
"#;

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Pipelines and layouts for drawing star batches into a layer target.
pub struct StarPipeline {
    additive: wgpu::RenderPipeline,
    alpha: wgpu::RenderPipeline,
    pub camera_bind_group_layout: wgpu::BindGroupLayout,
    pub batch_bind_group_layout: wgpu::BindGroupLayout,
}

impl StarPipeline {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("star-shader"),
            source: wgpu::ShaderSource::Wgsl(STAR_SHADER_SOURCE.into()),
        });

        let camera_bind_group_layout = uniform_layout(
            device,
            "star-camera-bgl",
            std::mem::size_of::<CameraUniform>() as u64,
        );
        let batch_bind_group_layout = uniform_layout(
            device,
            "star-batch-bgl",
            std::mem::size_of::<BatchUniform>() as u64,
        );

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("star-pipeline-layout"),
            bind_group_layouts: &[&camera_bind_group_layout, &batch_bind_group_layout],
            immediate_size: 0,
        });

        let build = |blend: wgpu::BlendState, label: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_star"),
                    buffers: &[StarInstance::LAYOUT],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_point"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };

        Self {
            additive: build(ADDITIVE, "star-additive-pipeline"),
            alpha: build(
                wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
                "star-alpha-pipeline",
            ),
            camera_bind_group_layout,
            batch_bind_group_layout,
        }
    }

    pub fn pipeline(&self, blend: BlendMode) -> &wgpu::RenderPipeline {
        match blend {
            BlendMode::Additive => &self.additive,
            BlendMode::Alpha => &self.alpha,
        }
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str, size: u64) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 96);
        assert_eq!(std::mem::size_of::<BatchUniform>(), 16);
    }

    #[test]
    fn test_instance_layout_covers_struct() {
        let layout = StarInstance::LAYOUT;
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        let last = layout.attributes.last().unwrap();
        assert_eq!(last.offset + 16, layout.array_stride);
    }

    #[test]
    fn test_pipeline_creation() {
        let Some((device, _queue)) = crate::test_device() else {
            return;
        };
        let pipeline = StarPipeline::new(&device, crate::targets::LAYER_FORMAT);
        let _ = pipeline.pipeline(BlendMode::Additive);
        let _ = pipeline.pipeline(BlendMode::Alpha);
    }
}
