//! Off-screen render targets owned by the wgpu backend.

use crate::compositor::{Extent, TargetId};
use crate::error::ResourceError;

/// Format of the base, bloom and overlay layers.
pub const LAYER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Format of the composite output.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Texture format used for a target.
pub fn format_for(target: TargetId) -> wgpu::TextureFormat {
    match target {
        TargetId::Output => OUTPUT_FORMAT,
        TargetId::Base | TargetId::Bloom | TargetId::Overlay => LAYER_FORMAT,
    }
}

/// Reject extents the device cannot allocate.
pub fn check_extent(
    target: TargetId,
    extent: Extent,
    max_dimension: u32,
) -> Result<(), ResourceError> {
    let reason = if extent.is_empty() {
        "extent must be non-zero".to_string()
    } else if extent.width > max_dimension || extent.height > max_dimension {
        format!("exceeds the device limit of {max_dimension}")
    } else {
        return Ok(());
    };
    Err(ResourceError::Allocation {
        target,
        width: extent.width,
        height: extent.height,
        reason,
    })
}

/// Bytes per row of a readback buffer, padded to wgpu's copy alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Run `create` inside out-of-memory and validation error scopes.
///
/// A captured error becomes [`ResourceError::Allocation`] for `target` instead
/// of reaching the device's uncaptured-error handler.
pub(crate) fn scoped_allocation<T>(
    device: &wgpu::Device,
    target: TargetId,
    extent: Extent,
    create: impl FnOnce() -> T,
) -> Result<T, ResourceError> {
    let out_of_memory = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    // Scopes pop innermost first.
    let validation_error = pollster::block_on(validation.pop());
    let memory_error = pollster::block_on(out_of_memory.pop());
    match memory_error.or(validation_error) {
        None => Ok(value),
        Some(err) => {
            log::error!("Allocating {target} target at {extent} failed: {err}");
            Err(ResourceError::Allocation {
                target,
                width: extent.width,
                height: extent.height,
                reason: err.to_string(),
            })
        }
    }
}

/// Create a 2D render-attachment texture with one mip and one sample.
pub(crate) fn create_attachment_texture(
    device: &wgpu::Device,
    label: &str,
    extent: Extent,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: extent.width,
            height: extent.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

/// A single-sample 2D texture that passes render into and later passes sample.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub extent: Extent,
    pub format: wgpu::TextureFormat,
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        target: TargetId,
        extent: Extent,
    ) -> Result<Self, ResourceError> {
        check_extent(target, extent, device.limits().max_texture_dimension_2d)?;
        let format = format_for(target);
        let label = format!("{target}-target");
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let texture = scoped_allocation(device, target, extent, || {
            create_attachment_texture(device, &label, extent, format, usage)
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::trace!("Allocated {label} at {extent} ({format:?})");
        Ok(Self {
            texture,
            view,
            extent,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_extent_is_rejected() {
        let err = check_extent(TargetId::Base, Extent::new(0, 720), 8192).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Allocation {
                target: TargetId::Base,
                width: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_oversized_extent_is_rejected() {
        assert!(check_extent(TargetId::Bloom, Extent::new(9000, 10), 8192).is_err());
        assert!(check_extent(TargetId::Bloom, Extent::new(8192, 8192), 8192).is_ok());
    }

    #[test]
    fn test_layers_are_hdr_and_output_is_srgb() {
        assert_eq!(format_for(TargetId::Overlay), wgpu::TextureFormat::Rgba16Float);
        assert_eq!(format_for(TargetId::Output), wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn test_row_padding_matches_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1280), 5120);
    }

    #[test]
    fn test_device_rejection_becomes_allocation_error() {
        let Some((device, _queue)) = crate::test_device() else {
            return;
        };
        // Skip the extent pre-check so the device itself rejects the texture.
        let result = scoped_allocation(&device, TargetId::Overlay, Extent::new(0, 0), || {
            create_attachment_texture(
                &device,
                "zero-sized",
                Extent::new(0, 0),
                LAYER_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        assert!(matches!(
            result,
            Err(ResourceError::Allocation {
                target: TargetId::Overlay,
                ..
            })
        ));
    }

    #[test]
    fn test_valid_texture_passes_through_scope() {
        let Some((device, _queue)) = crate::test_device() else {
            return;
        };
        let target = RenderTarget::new(&device, TargetId::Base, Extent::new(16, 8)).unwrap();
        assert_eq!(target.texture.width(), 16);
        assert_eq!(target.format, LAYER_FORMAT);
    }
}
