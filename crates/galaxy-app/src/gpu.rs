//! Headless GPU initialization. Frames render into off-screen targets, so no
//! surface or window is created.

/// Errors from bringing up the GPU.
#[derive(Debug, thiserror::Error)]
pub enum GpuContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Owns the wgpu instance, adapter, device and queue.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Pick an adapter from `backends`, falling back to every backend.
    pub async fn new(backends: wgpu::Backends) -> Result<Self, GpuContextError> {
        let (instance, adapter) = match request_adapter(backends).await {
            Some(found) => found,
            None => {
                tracing::warn!("No adapter on {backends:?}, trying all backends");
                request_adapter(wgpu::Backends::all())
                    .await
                    .ok_or(GpuContextError::NoAdapter)?
            }
        };

        let info = adapter.get_info();
        tracing::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("galaxy-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Blocking wrapper over [`GpuContext::new`] using `pollster`.
    pub fn new_blocking(backends: wgpu::Backends) -> Result<Self, GpuContextError> {
        pollster::block_on(Self::new(backends))
    }
}

async fn request_adapter(backends: wgpu::Backends) -> Option<(wgpu::Instance, wgpu::Adapter)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok()?;
    Some((instance, adapter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            GpuContextError::NoAdapter.to_string(),
            "no compatible GPU adapter found"
        );
    }

    #[test]
    fn test_headless_context() {
        let Ok(ctx) = GpuContext::new_blocking(wgpu::Backends::all()) else {
            return;
        };
        assert!(ctx.device.limits().max_texture_dimension_2d > 0);
    }
}
