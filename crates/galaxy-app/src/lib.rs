//! Headless galaxy renderer: GPU bootstrap, platform directories, the
//! fixed-timestep frame driver and screenshot output.

pub mod error;
pub mod frame_driver;
pub mod gpu;
pub mod platform;
pub mod screenshot;

pub use error::AppError;
pub use frame_driver::{FIXED_DT, FrameDriver, FrameReport, FrameState, MAX_FRAME_TIME};
pub use gpu::{GpuContext, GpuContextError};
pub use platform::{APP_NAME, PlatformDirs, PlatformError, preferred_backends};
pub use screenshot::write_png;
