//! Fixed-timestep frame driver.
//!
//! Camera motion advances at a fixed 60 Hz through an accumulator, so the
//! orbit is the same regardless of how long a frame took. Each rendered frame
//! writes the camera from [`FrameState`], refreshes star LOD and then asks the
//! compositor for a frame. The first [`ResourceError`] stops the driver.

use galaxy_config::CameraConfig;
use galaxy_render::{Camera, Compositor, RenderBackend, ResourceError, Scene, StarField};
use glam::{Quat, Vec3};
use tracing::{error, warn};

/// Fixed simulation timestep: 60 Hz.
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Longest frame time fed into the accumulator.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Explicit per-frame camera state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameState {
    pub position: Vec3,
    pub target: Vec3,
    /// Radians per second about +Z through `target`.
    pub orbit_rate: f32,
    /// Seconds of simulated time.
    pub sim_time: f64,
}

impl FrameState {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            target: Vec3::from_array(config.target),
            orbit_rate: config.orbit_degrees_per_second.to_radians(),
            sim_time: 0.0,
        }
    }

    /// Step the orbit by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        if self.orbit_rate != 0.0 {
            let rotation = Quat::from_rotation_z(self.orbit_rate * dt as f32);
            self.position = self.target + rotation * (self.position - self.target);
        }
        self.sim_time += dt;
    }

    /// Place `camera` at this state, looking at the target with +Z up.
    pub fn apply(&self, camera: &mut Camera) {
        camera.look_at(self.position, self.target, Vec3::Z);
    }
}

/// Outcome of [`FrameDriver::run`].
#[derive(Debug)]
pub struct FrameReport {
    pub frames_rendered: u64,
    pub updates: u64,
    /// The error that stopped the driver, if any.
    pub error: Option<ResourceError>,
}

impl FrameReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives frames until the budget runs out or the compositor fails.
pub struct FrameDriver {
    state: FrameState,
    accumulator: f64,
    frame_budget: u64,
    frames_rendered: u64,
    updates: u64,
    stopped: bool,
}

impl FrameDriver {
    pub fn new(state: FrameState, frame_budget: u64) -> Self {
        Self {
            state,
            accumulator: 0.0,
            frame_budget,
            frames_rendered: 0,
            updates: 0,
            stopped: false,
        }
    }

    /// Run one frame of `frame_time` seconds.
    ///
    /// Fixed updates run zero or more times, then the camera is written, LOD
    /// is refreshed and the compositor renders. On error the driver stops and
    /// later ticks do nothing.
    pub fn tick<B: RenderBackend>(
        &mut self,
        frame_time: f64,
        compositor: &mut Compositor<B>,
        scene: &Scene,
        star_field: &StarField,
        camera: &mut Camera,
    ) -> Result<(), ResourceError> {
        if self.stopped {
            return Err(ResourceError::Broken);
        }

        let mut frame_time = frame_time.max(0.0);
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        while self.accumulator >= FIXED_DT {
            self.state.advance(FIXED_DT);
            self.accumulator -= FIXED_DT;
            self.updates += 1;
        }

        self.state.apply(camera);
        star_field.update_scale(Some(camera));
        if let Err(err) = compositor.render_frame(scene, camera) {
            error!(
                "Frame {} failed, stopping: {err}",
                self.frames_rendered + 1
            );
            self.stopped = true;
            return Err(err);
        }
        self.frames_rendered += 1;
        Ok(())
    }

    /// Render the whole budget with a fixed step per frame.
    pub fn run<B: RenderBackend>(
        &mut self,
        compositor: &mut Compositor<B>,
        scene: &Scene,
        star_field: &StarField,
        camera: &mut Camera,
    ) -> FrameReport {
        let mut failure = None;
        while !self.is_finished() {
            if let Err(err) = self.tick(FIXED_DT, compositor, scene, star_field, camera) {
                failure = Some(err);
                break;
            }
        }
        tracing::info!(
            frames = self.frames_rendered,
            updates = self.updates,
            "Frame driver finished"
        );
        FrameReport {
            frames_rendered: self.frames_rendered,
            updates: self.updates,
            error: failure,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stopped || self.frames_rendered >= self.frame_budget
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_config::{LodConfig, RenderConfig};
    use galaxy_gen::{Population, SpectralClass, StarSample};
    use galaxy_render::{
        CompositeDescriptor, Extent, PipelineDescriptor, PostEffect, TargetId, scale_for_distance,
    };
    use std::collections::HashMap;

    /// Counts composites and fails once `fail_at` frames have been composed.
    #[derive(Default)]
    struct CountingBackend {
        targets: HashMap<TargetId, Extent>,
        composites: u64,
        fail_at: Option<u64>,
        distances: Vec<f32>,
        scales: Vec<f32>,
    }

    impl RenderBackend for CountingBackend {
        fn create_target(&mut self, target: TargetId, extent: Extent) -> Result<(), ResourceError> {
            self.targets.insert(target, extent);
            Ok(())
        }

        fn resize_target(&mut self, target: TargetId, extent: Extent) -> Result<(), ResourceError> {
            self.create_target(target, extent)
        }

        fn target_extent(&self, target: TargetId) -> Option<Extent> {
            self.targets.get(&target).copied()
        }

        fn render_layers(
            &mut self,
            scene: &Scene,
            camera: &Camera,
            target: TargetId,
        ) -> Result<(), ResourceError> {
            if target == TargetId::Base {
                self.distances.push(camera.distance_to(Vec3::ZERO));
                if let Some(batch) = scene.batches().next() {
                    self.scales.push(batch.scale());
                }
            }
            Ok(())
        }

        fn apply_effect(&mut self, _: &PostEffect, _: TargetId) -> Result<(), ResourceError> {
            Ok(())
        }

        fn composite(&mut self, _: &CompositeDescriptor) -> Result<(), ResourceError> {
            if self.fail_at == Some(self.composites) {
                return Err(ResourceError::Readback("device lost".into()));
            }
            self.composites += 1;
            Ok(())
        }
    }

    fn compositor(backend: CountingBackend) -> Compositor<CountingBackend> {
        Compositor::new(
            backend,
            PipelineDescriptor::standard(&RenderConfig::default()),
            Extent::new(64, 64),
        )
        .unwrap()
    }

    fn one_star_scene() -> (Scene, StarField) {
        let sample = StarSample {
            position: Vec3::ZERO,
            color: [1.0, 0.9, 0.8],
            size: 1.0,
            population: Population::Core,
            class: Some(SpectralClass::K),
        };
        let mut star_field = StarField::build(vec![sample], &LodConfig::default());
        let mut scene = Scene::default();
        star_field.attach(&mut scene);
        (scene, star_field)
    }

    fn state_at(position: Vec3, orbit_rate: f32) -> FrameState {
        FrameState {
            position,
            target: Vec3::ZERO,
            orbit_rate,
            sim_time: 0.0,
        }
    }

    #[test]
    fn test_fixed_dt_value() {
        assert!((FIXED_DT - 1.0 / 60.0).abs() < f64::EPSILON * 10.0);
    }

    #[test]
    fn test_orbit_keeps_distance_to_target() {
        let mut state = state_at(Vec3::new(100.0, 0.0, 30.0), std::f32::consts::FRAC_PI_2);
        state.advance(1.0);
        assert!((state.position.x).abs() < 1e-3);
        assert!((state.position.y - 100.0).abs() < 1e-3);
        assert!((state.position.z - 30.0).abs() < 1e-6);
        assert!((state.sim_time - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_orbit_rate_holds_still() {
        let start = Vec3::new(10.0, 20.0, 5.0);
        let mut state = state_at(start, 0.0);
        state.advance(10.0);
        assert_eq!(state.position, start);
    }

    #[test]
    fn test_state_from_config() {
        let config = CameraConfig::default();
        let state = FrameState::from_config(&config);
        assert_eq!(state.position, Vec3::from_array(config.position));
        assert!((state.orbit_rate - 6.0_f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn test_runs_exact_budget() {
        let mut compositor = compositor(CountingBackend::default());
        let (scene, star_field) = one_star_scene();
        let mut camera = Camera::default();
        let mut driver = FrameDriver::new(state_at(Vec3::new(0.0, 250.0, 0.0), 0.5), 5);

        let report = driver.run(&mut compositor, &scene, &star_field, &mut camera);

        assert!(report.is_success());
        assert_eq!(report.frames_rendered, 5);
        assert_eq!(report.updates, 5);
        assert_eq!(compositor.backend().composites, 5);
        assert!(driver.is_finished());
    }

    #[test]
    fn test_camera_and_lod_are_written_before_render() {
        let mut compositor = compositor(CountingBackend::default());
        let (scene, star_field) = one_star_scene();
        let mut camera = Camera::default();
        let start = Vec3::new(0.0, 500.0, 0.0);
        let mut driver = FrameDriver::new(state_at(start, 0.0), 1);

        driver.run(&mut compositor, &scene, &star_field, &mut camera);

        let backend = compositor.backend();
        assert_eq!(backend.distances, vec![500.0]);
        let expected = scale_for_distance(500.0, &LodConfig::default());
        assert_eq!(backend.scales, vec![expected]);
    }

    #[test]
    fn test_stops_on_first_error() {
        let backend = CountingBackend {
            fail_at: Some(2),
            ..Default::default()
        };
        let mut compositor = compositor(backend);
        let (scene, star_field) = one_star_scene();
        let mut camera = Camera::default();
        let mut driver = FrameDriver::new(state_at(Vec3::new(0.0, 250.0, 0.0), 0.0), 10);

        let report = driver.run(&mut compositor, &scene, &star_field, &mut camera);

        assert_eq!(report.frames_rendered, 2);
        assert!(matches!(report.error, Some(ResourceError::Readback(_))));
        assert!(driver.is_finished());
        assert!(compositor.is_broken());

        // Later ticks are refused without touching the compositor.
        let frames = compositor.frames();
        let result = driver.tick(FIXED_DT, &mut compositor, &scene, &star_field, &mut camera);
        assert!(matches!(result, Err(ResourceError::Broken)));
        assert_eq!(compositor.frames(), frames);
    }

    #[test]
    fn test_partial_step_accumulates() {
        let mut compositor = compositor(CountingBackend::default());
        let (scene, star_field) = one_star_scene();
        let mut camera = Camera::default();
        let mut driver = FrameDriver::new(state_at(Vec3::new(0.0, 250.0, 0.0), 1.0), 10);

        driver
            .tick(0.5 * FIXED_DT, &mut compositor, &scene, &star_field, &mut camera)
            .unwrap();
        assert_eq!(driver.state().sim_time, 0.0);
        assert_eq!(driver.frames_rendered(), 1);

        driver
            .tick(0.5 * FIXED_DT, &mut compositor, &scene, &star_field, &mut camera)
            .unwrap();
        assert!((driver.state().sim_time - FIXED_DT).abs() < 1e-12);
        assert_eq!(driver.frames_rendered(), 2);
    }

    #[test]
    fn test_long_frame_is_clamped() {
        let mut compositor = compositor(CountingBackend::default());
        let (scene, star_field) = one_star_scene();
        let mut camera = Camera::default();
        let mut driver = FrameDriver::new(state_at(Vec3::new(0.0, 250.0, 0.0), 0.0), 10);

        driver
            .tick(5.0, &mut compositor, &scene, &star_field, &mut camera)
            .unwrap();
        let max_updates = (MAX_FRAME_TIME / FIXED_DT).ceil();
        assert!(driver.state().sim_time <= max_updates * FIXED_DT + 1e-9);
        assert!(driver.state().sim_time > 0.0);
    }
}
