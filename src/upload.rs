use bytemuck::Pod;
use log::debug;

use crate::backend::{BufferKind, ComputeBackend};
use crate::error::BackendError;
use crate::scene::{PointLight, Scene, Sphere, Triangle};

/// A record type with a fixed storage buffer slot.
pub trait GpuRecord: Pod {
    const KIND: BufferKind;
}

impl GpuRecord for PointLight {
    const KIND: BufferKind = BufferKind::Lights;
}

impl GpuRecord for Sphere {
    const KIND: BufferKind = BufferKind::Spheres;
}

impl GpuRecord for Triangle {
    const KIND: BufferKind = BufferKind::Triangles;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Bound { slot: u32, bytes: usize },
    /// Empty collection: nothing allocated and the slot stays unbound.
    Skipped { slot: u32 },
}

/// Replaces the storage buffer for `R`'s slot with `records`, in order.
pub fn upload<B, R>(backend: &mut B, records: &[R]) -> Result<UploadOutcome, BackendError>
where
    B: ComputeBackend + ?Sized,
    R: GpuRecord,
{
    let kind = R::KIND;
    if records.is_empty() {
        debug!("no {} to upload; slot {} left unbound", kind.label(), kind.slot());
        backend.unbind_storage(kind);
        return Ok(UploadOutcome::Skipped { slot: kind.slot() });
    }
    let bytes: &[u8] = bytemuck::cast_slice(records);
    backend.upload_storage(kind, bytes)?;
    debug!(
        "uploaded {} {} ({} bytes) to slot {}",
        records.len(),
        kind.label(),
        bytes.len(),
        kind.slot()
    );
    Ok(UploadOutcome::Bound {
        slot: kind.slot(),
        bytes: bytes.len(),
    })
}

/// Uploads lights, spheres and triangles.
pub fn upload_scene<B>(backend: &mut B, scene: &Scene) -> Result<[UploadOutcome; 3], BackendError>
where
    B: ComputeBackend + ?Sized,
{
    Ok([
        upload(backend, &scene.lights)?,
        upload(backend, &scene.spheres)?,
        upload(backend, &scene.triangles)?,
    ])
}
