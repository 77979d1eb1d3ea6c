use std::sync::Arc;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::backend::ComputeBackend;
use crate::camera::Camera;
use crate::error::BackendError;
use crate::input::InputState;
use crate::scene::{RenderSettings, Scene, SceneDescription, SceneTotals};

/// Pixels covered by one kernel work group along x.
pub const TILE_WIDTH: u32 = 8;
/// Pixels covered by one kernel work group along y.
pub const TILE_HEIGHT: u32 = 4;

/// Number of work groups to dispatch along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkGroups {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkGroups {
    /// Grid covering the image; sizes are whole tiles (see [`RenderSettings::validate`]).
    pub fn for_image(render: RenderSettings) -> Self {
        Self {
            x: render.width / TILE_WIDTH,
            y: render.height / TILE_HEIGHT,
            z: 1,
        }
    }
}

/// Uniform block read by the kernel. Field order matches `Params` in the WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub camera_position: [f32; 4],
    pub camera_target: [f32; 4],
    pub camera_up: [f32; 4],
    pub camera_right: [f32; 4],
    pub background_color: [f32; 4],
    pub fov: f32,
    pub b_volume: f32,
    pub light_count: u32,
    pub sphere_count: u32,
    pub triangle_count: u32,
    _padding: [u32; 3],
}

impl FrameUniforms {
    pub fn new(camera: &Camera, totals: SceneTotals, background: Vec3) -> Self {
        let basis = camera.basis();
        Self {
            camera_position: basis.position.extend(0.0).into(),
            camera_target: basis.forward.extend(0.0).into(),
            camera_up: basis.up.extend(0.0).into(),
            camera_right: basis.right.extend(0.0).into(),
            background_color: background.extend(1.0).into(),
            fov: camera.fov,
            b_volume: totals.bounding_radius,
            light_count: totals.lights,
            sphere_count: totals.spheres,
            triangle_count: totals.triangles,
            _padding: [0; 3],
        }
    }
}

/// Monotonic frame timer. The first tick reports zero.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous tick, never negative.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last = Some(now);
        delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Continue,
    Exit,
}

/// Owns everything a frame reads: camera, scene, shared input and settings.
pub struct FrameContext {
    pub camera: Camera,
    pub scene: Scene,
    pub input: Arc<InputState>,
    pub background: Vec3,
    pub render: RenderSettings,
    clock: FrameClock,
}

impl FrameContext {
    pub fn new(description: &SceneDescription, scene: Scene, input: Arc<InputState>) -> Self {
        Self {
            camera: Camera::new(description.camera),
            scene,
            input,
            background: description.background,
            render: description.render,
            clock: FrameClock::new(),
        }
    }

    /// Runs one frame: timing, camera, exit check, uniforms, dispatch,
    /// barrier, present. Exit leaves the GPU untouched.
    pub fn step<B>(&mut self, backend: &mut B, now: Instant) -> Result<FrameStatus, BackendError>
    where
        B: ComputeBackend + ?Sized,
    {
        let delta_time = self.clock.tick(now);

        let pointer = self.input.take_pointer_delta();
        if pointer.x != 0.0 || pointer.y != 0.0 {
            self.camera.update_orientation(pointer.x, pointer.y);
        }
        self.camera
            .update_position(self.input.movement(), delta_time);

        if self.input.exit_requested() {
            return Ok(FrameStatus::Exit);
        }

        backend.set_uniforms(&FrameUniforms::new(
            &self.camera,
            self.scene.totals(),
            self.background,
        ));
        backend.dispatch(WorkGroups::for_image(self.render))?;
        backend.barrier()?;
        backend.present()?;
        Ok(FrameStatus::Continue)
    }

    /// Releases GPU resources before the process exits.
    pub fn shutdown<B: ComputeBackend + ?Sized>(&mut self, backend: &mut B) {
        backend.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::testing::{Call, RecordingBackend};
    use crate::input::KeyCode;
    use crate::scene::Triangle;

    fn context() -> FrameContext {
        let description = SceneDescription::default();
        let triangles = vec![Triangle::new(Vec3::X, Vec3::Y, Vec3::Z)];
        let scene = Scene::new(description.lights.clone(), Vec::new(), triangles);
        FrameContext::new(&description, scene, Arc::new(InputState::new()))
    }

    #[test]
    fn uniform_block_is_padded_to_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 112);
    }

    #[test]
    fn work_groups_cover_the_image() {
        let groups = WorkGroups::for_image(RenderSettings {
            width: 1024,
            height: 1024,
        });
        assert_eq!(groups, WorkGroups { x: 128, y: 256, z: 1 });
    }

    #[test]
    fn clock_starts_at_zero_and_never_goes_negative() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        let later = start + Duration::from_millis(250);
        assert_eq!(clock.tick(start), 0.0);
        assert!((clock.tick(later) - 0.25).abs() < 1e-6);
        assert_eq!(clock.tick(start), 0.0);
    }

    #[test]
    fn frame_runs_steps_in_order() {
        let mut context = context();
        let mut backend = RecordingBackend::default();
        let status = context.step(&mut backend, Instant::now()).unwrap();
        assert_eq!(status, FrameStatus::Continue);
        assert_eq!(backend.calls.len(), 4);
        assert!(matches!(backend.calls[0], Call::SetUniforms(_)));
        assert_eq!(
            backend.calls[1..],
            [
                Call::Dispatch(WorkGroups { x: 128, y: 256, z: 1 }),
                Call::Barrier,
                Call::Present,
            ]
        );
    }

    #[test]
    fn uniforms_carry_camera_and_scene_totals() {
        let mut context = context();
        let mut backend = RecordingBackend::default();
        context.step(&mut backend, Instant::now()).unwrap();
        let Call::SetUniforms(uniforms) = backend.calls[0].clone() else {
            panic!("expected uniforms first");
        };
        assert_eq!(uniforms.fov, 90.0);
        assert_eq!(uniforms.camera_position, [0.0, 0.0, 3.0, 0.0]);
        assert_eq!(uniforms.camera_target, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(uniforms.light_count, 3);
        assert_eq!(uniforms.sphere_count, 0);
        assert_eq!(uniforms.triangle_count, 1);
        assert_eq!(uniforms.b_volume, 1.0);
        assert_eq!(uniforms.background_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn exit_request_skips_gpu_work() {
        let mut context = context();
        context.input.request_exit();
        let mut backend = RecordingBackend::default();
        let status = context.step(&mut backend, Instant::now()).unwrap();
        assert_eq!(status, FrameStatus::Exit);
        assert!(backend.calls.is_empty());

        context.shutdown(&mut backend);
        assert_eq!(backend.calls, vec![Call::Release]);
    }

    #[test]
    fn missing_barrier_is_reported() {
        let mut context = context();
        let mut backend = RecordingBackend::without_barrier();
        assert!(matches!(
            context.step(&mut backend, Instant::now()),
            Err(BackendError::MissingBarrier)
        ));
    }

    #[test]
    fn held_keys_move_the_camera_by_elapsed_time() {
        let mut context = context();
        let mut backend = RecordingBackend::default();
        let start = Instant::now();
        context.step(&mut backend, start).unwrap();

        context.input.set_key_down(KeyCode::Character('W'));
        context
            .step(&mut backend, start + Duration::from_millis(500))
            .unwrap();
        assert!(context
            .camera
            .position()
            .abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));
    }

    #[test]
    fn pointer_motion_is_applied_once() {
        let mut context = context();
        let mut backend = RecordingBackend::default();
        context.input.add_pointer_delta(0.0, 100.0);
        context.step(&mut backend, Instant::now()).unwrap();
        assert!((context.camera.pitch() - 10.0).abs() < 1e-5);
        context.step(&mut backend, Instant::now()).unwrap();
        assert!((context.camera.pitch() - 10.0).abs() < 1e-5);
    }
}
