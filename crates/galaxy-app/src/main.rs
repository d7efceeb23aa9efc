//! `galaxy`: generate a galaxy, render it headless for a number of frames and
//! optionally save the last frame as PNG.

use std::process::ExitCode;

use clap::Parser;
use galaxy_app::{
    AppError, FrameDriver, FrameState, GpuContext, PlatformDirs, preferred_backends, write_png,
};
use galaxy_config::{CliArgs, Config};
use galaxy_gen::GalaxyGenerator;
use galaxy_render::{Camera, Compositor, Extent, PipelineDescriptor, Scene, StarField, WgpuBackend};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("galaxy: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<(), AppError> {
    let mut dirs = PlatformDirs::resolve()?;
    if let Some(config_dir) = &args.config {
        dirs = dirs.with_config_dir(config_dir.clone());
    }
    dirs.create_dirs()?;

    let logging = galaxy_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions));
    info!(
        config_dir = %dirs.config_dir.display(),
        log_dir = %dirs.log_dir.display(),
        "Galaxy renderer starting"
    );

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(args);
    logging.apply_config(&config);
    config.validate()?;

    let generator = GalaxyGenerator::new(config.galaxy.clone(), args.seed)?;
    let samples = generator.generate();
    info!(samples = samples.len(), seed = args.seed, "Generated galaxy");

    let mut star_field = StarField::build(samples, &config.render.lod);
    let mut scene = Scene::new();
    star_field.attach(&mut scene);

    let GpuContext { device, queue, .. } = GpuContext::new_blocking(preferred_backends())?;
    let backend = WgpuBackend::new(device, queue, &config.render);
    let viewport = Extent::new(config.render.width, config.render.height);
    let mut compositor =
        Compositor::new(backend, PipelineDescriptor::standard(&config.render), viewport)?;

    let mut camera = Camera::from_config(&config.camera, viewport.aspect_ratio());
    let mut driver = FrameDriver::new(FrameState::from_config(&config.camera), args.frames);
    let report = driver.run(&mut compositor, &scene, &star_field, &mut camera);
    if let Some(err) = report.error {
        return Err(err.into());
    }

    if let Some(path) = &args.screenshot {
        if report.frames_rendered == 0 {
            warn!("No frames rendered; screenshot will be blank");
        }
        let (extent, pixels) = compositor.backend().read_output()?;
        write_png(path, extent, &pixels)?;
    }

    info!(frames = report.frames_rendered, "Done");
    Ok(())
}
