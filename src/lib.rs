//! Real-time ray tracer driven by a GPU compute kernel.
//!
//! Loading, bounding volumes, uploads and the per-frame sequence are plain
//! Rust behind the [`ComputeBackend`] trait, so everything except the wgpu
//! backend in [`render::gpu`] runs without a graphics context.

pub mod app;
pub mod backend;
pub mod bounds;
pub mod camera;
pub mod error;
pub mod frame;
pub mod input;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod upload;

pub use app::CliOptions;
pub use backend::{BufferKind, ComputeBackend, FrameSync};
pub use camera::{Camera, CameraBasis, CameraSettings};
pub use error::{BackendError, MalformedRecord, MeshError};
pub use frame::{FrameContext, FrameStatus, FrameUniforms, WorkGroups};
pub use input::{InputState, KeyCode, Movement, NamedKey};
pub use render::GpuBackend;
pub use scene::{PointLight, RenderSettings, Scene, SceneDescription, SceneTotals, Sphere, Triangle};
pub use upload::{upload, upload_scene, GpuRecord, UploadOutcome};
