//! PNG output of the composed frame.

use std::io::Write;
use std::path::Path;

use galaxy_render::Extent;

use crate::error::AppError;

/// Encode tightly packed RGBA8 `pixels` of `extent` as PNG.
pub fn encode_png<W: Write>(writer: W, extent: Extent, pixels: &[u8]) -> Result<(), AppError> {
    let mut encoder = png::Encoder::new(writer, extent.width, extent.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    writer.finish()?;
    Ok(())
}

/// Write the frame to `path`, creating its parent directory.
pub fn write_png(path: &Path, extent: Extent, pixels: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    encode_png(file, extent, pixels)?;
    tracing::info!("Saved screenshot to {}", path.display());
    Ok(())
}
