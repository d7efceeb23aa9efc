//! Mip-chain bloom applied in place to the bloom layer target.
//!
//! Extracts bright pixels, progressively blurs them through a
//! downsample/upsample chain and adds the glow back onto the source target.
//! Tonemapping is left to the composite pass.

use bytemuck::{Pod, Zeroable};
use galaxy_config::RenderConfig;
use wgpu::util::DeviceExt;

use crate::compositor::{Extent, TargetId};
use crate::error::ResourceError;
use crate::targets::{RenderTarget, create_attachment_texture, scoped_allocation};

/// Configuration for the bloom post effect.
#[derive(Clone, Debug, PartialEq)]
pub struct BloomConfig {
    /// Only pixels with luminance above this value contribute to bloom.
    pub threshold: f32,
    /// Width of the soft ramp below the threshold. Keep it below `threshold`.
    pub soft_knee: f32,
    /// Glow intensity multiplier.
    pub intensity: f32,
    /// Number of downscale iterations. Each halves resolution and widens the glow.
    pub iterations: u32,
    /// Scales the blur tap offset.
    pub radius: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            soft_knee: 0.1,
            intensity: 1.5,
            iterations: 5,
            radius: 1.0,
        }
    }
}

impl From<&RenderConfig> for BloomConfig {
    fn from(render: &RenderConfig) -> Self {
        Self {
            threshold: render.bloom_threshold,
            intensity: render.bloom_strength,
            iterations: render.bloom_iterations,
            radius: render.bloom_radius,
            ..Self::default()
        }
    }
}

/// GPU uniform for bloom shader parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct BloomParams {
    pub threshold: f32,
    pub soft_knee: f32,
    pub intensity: f32,
    pub radius: f32,
}

impl From<&BloomConfig> for BloomParams {
    fn from(config: &BloomConfig) -> Self {
        Self {
            threshold: config.threshold,
            soft_knee: config.soft_knee,
            intensity: config.intensity,
            radius: config.radius,
        }
    }
}

/// WGSL source for the bloom passes (extract, downsample, upsample, composite).
pub const BLOOM_SHADER_SOURCE: &str = r#"
struct BloomParams {
    threshold: f32,
    soft_knee: f32,
    intensity: f32,
    radius: f32,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: BloomParams;
@group(1) @binding(0) var input_tex: texture_2d<f32>;
@group(1) @binding(1) var input_sampler: sampler;

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn soft_threshold(color: vec3<f32>, threshold: f32, knee: f32) -> vec3<f32> {
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    let soft = luminance - threshold + knee;
    let soft_clamped = clamp(soft, 0.0, 2.0 * knee);
    let contribution = soft_clamped * soft_clamped / (4.0 * knee + 0.0001);
    let factor = max(luminance - threshold, contribution) / max(luminance, 0.0001);
    return color * max(factor, 0.0);
}

@fragment
fn fs_extract(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(input_tex, input_sampler, in.uv).rgb;
    return vec4<f32>(soft_threshold(color, params.threshold, params.soft_knee), 1.0);
}

@fragment
fn fs_downsample(in: VertexOutput) -> @location(0) vec4<f32> {
    let dims = vec2<f32>(textureDimensions(input_tex));
    let texel = params.radius / dims;
    let a = textureSample(input_tex, input_sampler, in.uv + vec2(-texel.x, -texel.y)).rgb;
    let b = textureSample(input_tex, input_sampler, in.uv + vec2( texel.x, -texel.y)).rgb;
    let c = textureSample(input_tex, input_sampler, in.uv + vec2(-texel.x,  texel.y)).rgb;
    let d = textureSample(input_tex, input_sampler, in.uv + vec2( texel.x,  texel.y)).rgb;
    return vec4<f32>((a + b + c + d) * 0.25, 1.0);
}

@fragment
fn fs_upsample(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(textureSample(input_tex, input_sampler, in.uv).rgb, 1.0);
}

@fragment
fn fs_bloom_composite(in: VertexOutput) -> @location(0) vec4<f32> {
    let bloom = textureSample(input_tex, input_sampler, in.uv).rgb;
    return vec4<f32>(bloom * params.intensity, 0.0);
}
"#;

/// Extents of the blur chain for a source extent: each level halves the last,
/// never dropping below one pixel.
pub fn mip_extents(source: Extent, iterations: u32) -> Vec<Extent> {
    let mut w = (source.width / 2).max(1);
    let mut h = (source.height / 2).max(1);
    let mut extents = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        extents.push(Extent::new(w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    extents
}

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Bloom post effect over an HDR target.
///
/// The blur chain is allocated lazily and rebuilt whenever the source extent
/// or the iteration count changes.
pub struct BloomPipeline {
    config: BloomConfig,
    format: wgpu::TextureFormat,
    texture_bgl: wgpu::BindGroupLayout,
    extract_pipeline: wgpu::RenderPipeline,
    downsample_pipeline: wgpu::RenderPipeline,
    upsample_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    chain_extent: Option<Extent>,
    mip_textures: Vec<wgpu::Texture>,
    mip_views: Vec<wgpu::TextureView>,
    mip_bind_groups: Vec<wgpu::BindGroup>,
}

impl BloomPipeline {
    /// `format` is the format of the targets bloom runs on (typically `Rgba16Float`).
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, config: BloomConfig) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bloom-shader"),
            source: wgpu::ShaderSource::Wgsl(BLOOM_SHADER_SOURCE.into()),
        });

        let params_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom-params-bgl"),
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
        let texture_bgl = sampled_texture_layout(device, "bloom-texture-bgl");

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bloom-layout"),
            bind_group_layouts: &[&params_bgl, &texture_bgl],
            immediate_size: 0,
        });

        let fullscreen = |entry: &str, blend: Option<wgpu::BlendState>, label: &str| {
            create_fullscreen_pipeline(device, &shader, &layout, entry, format, blend, label)
        };
        let extract_pipeline = fullscreen("fs_extract", None, "bloom-extract");
        let downsample_pipeline = fullscreen("fs_downsample", None, "bloom-downsample");
        let upsample_pipeline = fullscreen("fs_upsample", Some(ADDITIVE), "bloom-upsample");
        let composite_pipeline = fullscreen("fs_bloom_composite", Some(ADDITIVE), "bloom-composite");

        let sampler = create_linear_sampler(device, "bloom-sampler");

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bloom-params"),
            contents: bytemuck::cast_slice(&[BloomParams::from(&config)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bloom-params-bg"),
            layout: &params_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        Self {
            config,
            format,
            texture_bgl,
            extract_pipeline,
            downsample_pipeline,
            upsample_pipeline,
            composite_pipeline,
            sampler,
            params_buffer,
            params_bind_group,
            chain_extent: None,
            mip_textures: Vec::new(),
            mip_views: Vec::new(),
            mip_bind_groups: Vec::new(),
        }
    }

    pub fn config(&self) -> &BloomConfig {
        &self.config
    }

    /// Update bloom parameters. A changed iteration count rebuilds the chain.
    pub fn update_config(&mut self, queue: &wgpu::Queue, config: &BloomConfig) {
        if *config == self.config {
            return;
        }
        if config.iterations != self.config.iterations {
            self.chain_extent = None;
        }
        queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::cast_slice(&[BloomParams::from(config)]),
        );
        self.config = config.clone();
    }

    /// Number of allocated blur levels.
    pub fn mip_count(&self) -> usize {
        self.mip_textures.len()
    }

    /// Rebuild the mip chain for `extent`. On failure the chain is left
    /// empty and rebuilt on the next call.
    fn ensure_chain(&mut self, device: &wgpu::Device, extent: Extent) -> Result<(), ResourceError> {
        if self.chain_extent == Some(extent) {
            return Ok(());
        }
        self.chain_extent = None;
        self.mip_textures.clear();
        self.mip_views.clear();
        self.mip_bind_groups.clear();
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        for (i, mip) in mip_extents(extent, self.config.iterations)
            .into_iter()
            .enumerate()
        {
            let texture = scoped_allocation(device, TargetId::Bloom, mip, || {
                create_attachment_texture(device, "bloom-mip", mip, self.format, usage)
            })?;
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = sampled_texture_bind_group(
                device,
                &self.texture_bgl,
                &view,
                &self.sampler,
                "bloom-mip-bg",
            );
            log::trace!("Bloom mip {i}: {mip}");
            self.mip_textures.push(texture);
            self.mip_views.push(view);
            self.mip_bind_groups.push(bind_group);
        }
        self.chain_extent = Some(extent);
        Ok(())
    }

    /// Extract, blur and add the glow back onto `target`.
    pub fn execute(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget,
    ) -> Result<(), ResourceError> {
        if self.config.iterations == 0 {
            return Ok(());
        }
        self.ensure_chain(device, target.extent)?;
        let levels = self.mip_textures.len();
        if levels == 0 {
            return Ok(());
        }
        let source_bind_group = sampled_texture_bind_group(
            device,
            &self.texture_bgl,
            &target.view,
            &self.sampler,
            "bloom-source-bg",
        );

        // Bright pixels: target -> mip[0]
        self.run_pass(
            encoder,
            &self.extract_pipeline,
            &source_bind_group,
            &self.mip_views[0],
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            "bloom-extract",
        );

        for i in 1..levels {
            self.run_pass(
                encoder,
                &self.downsample_pipeline,
                &self.mip_bind_groups[i - 1],
                &self.mip_views[i],
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                "bloom-downsample",
            );
        }

        for i in (0..levels - 1).rev() {
            self.run_pass(
                encoder,
                &self.upsample_pipeline,
                &self.mip_bind_groups[i + 1],
                &self.mip_views[i],
                wgpu::LoadOp::Load,
                "bloom-upsample",
            );
        }

        // Glow back onto the layer, keeping what the pass drew.
        self.run_pass(
            encoder,
            &self.composite_pipeline,
            &self.mip_bind_groups[0],
            &target.view,
            wgpu::LoadOp::Load,
            "bloom-composite",
        );
        Ok(())
    }

    fn run_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        texture_bind_group: &wgpu::BindGroup,
        target_view: &wgpu::TextureView,
        load_op: wgpu::LoadOp<wgpu::Color>,
        label: &str,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: load_op,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.params_bind_group, &[]);
        pass.set_bind_group(1, texture_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Layout for one filterable 2D texture plus its sampler.
pub(crate) fn sampled_texture_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn sampled_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

pub(crate) fn create_linear_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Linear,
        ..Default::default()
    })
}

/// Fullscreen-triangle pipeline using the shader's `vs_fullscreen` entry.
pub(crate) fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment_entry: &str,
    target_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}
