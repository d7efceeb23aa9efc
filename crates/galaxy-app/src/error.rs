use galaxy_config::ConfigError;
use galaxy_render::ResourceError;

use crate::gpu::GpuContextError;
use crate::platform::PlatformError;

/// Anything that aborts the `galaxy` binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GPU initialization failed: {0}")]
    Gpu(#[from] GpuContextError),

    #[error("rendering failed: {0}")]
    Resource(#[from] ResourceError),

    #[error("failed to write screenshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode screenshot: {0}")]
    Png(#[from] png::EncodingError),
}
