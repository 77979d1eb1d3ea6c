//! The narrow seam between the frame logic and the GPU.
//!
//! Everything above this trait (camera, mesh loading, bounds, uploads, frame
//! sequencing) runs without a graphics context.

use crate::error::BackendError;
use crate::frame::{FrameUniforms, WorkGroups};

/// Storage buffer collections and their fixed binding slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Lights,
    Spheres,
    Triangles,
}

impl BufferKind {
    pub const ALL: [Self; 3] = [Self::Lights, Self::Spheres, Self::Triangles];

    pub const fn slot(self) -> u32 {
        match self {
            Self::Lights => 1,
            Self::Spheres => 2,
            Self::Triangles => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Lights => "lights",
            Self::Spheres => "spheres",
            Self::Triangles => "triangles",
        }
    }
}

/// Operations the frame loop needs from a GPU.
pub trait ComputeBackend {
    /// Replaces the buffer bound at `kind`'s slot with `bytes`.
    /// Never called with an empty slice.
    fn upload_storage(&mut self, kind: BufferKind, bytes: &[u8]) -> Result<(), BackendError>;

    /// Drops whatever is bound at `kind`'s slot, if anything.
    fn unbind_storage(&mut self, kind: BufferKind);

    fn set_uniforms(&mut self, uniforms: &FrameUniforms);

    fn dispatch(&mut self, groups: WorkGroups) -> Result<(), BackendError>;

    /// Makes every image write of the last dispatch visible to presentation.
    fn barrier(&mut self) -> Result<(), BackendError>;

    /// Clears the target, draws the full-screen quad and presents it.
    fn present(&mut self) -> Result<(), BackendError>;

    /// Frees the output image. The backend is unusable afterwards.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FrameStage {
    #[default]
    Idle,
    Dispatched,
    Synchronized,
}

/// Tracks the dispatch → barrier → present order inside a backend.
#[derive(Debug, Default)]
pub struct FrameSync {
    stage: FrameStage,
}

impl FrameSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&mut self) {
        self.stage = FrameStage::Dispatched;
    }

    /// Returns true if a dispatch was waiting on this barrier.
    pub fn synchronized(&mut self) -> bool {
        let pending = self.stage == FrameStage::Dispatched;
        self.stage = FrameStage::Synchronized;
        pending
    }

    /// Fails if the image is about to be sampled while still being written.
    pub fn begin_present(&mut self) -> Result<(), BackendError> {
        if self.stage == FrameStage::Dispatched {
            return Err(BackendError::MissingBarrier);
        }
        self.stage = FrameStage::Idle;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Upload { kind: BufferKind, bytes: usize },
        Unbind(BufferKind),
        SetUniforms(FrameUniforms),
        Dispatch(WorkGroups),
        Barrier,
        Present,
        Release,
    }

    /// Backend that records every call and keeps uploaded bytes per slot.
    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        pub calls: Vec<Call>,
        pub bound: HashMap<u32, Vec<u8>>,
        pub skip_barrier: bool,
        sync: FrameSync,
    }

    impl RecordingBackend {
        /// A backend whose `barrier` does nothing, so presents follow dispatches directly.
        pub fn without_barrier() -> Self {
            Self {
                skip_barrier: true,
                ..Self::default()
            }
        }
    }

    impl ComputeBackend for RecordingBackend {
        fn upload_storage(&mut self, kind: BufferKind, bytes: &[u8]) -> Result<(), BackendError> {
            assert!(!bytes.is_empty(), "zero-length allocation attempted");
            self.calls.push(Call::Upload {
                kind,
                bytes: bytes.len(),
            });
            self.bound.insert(kind.slot(), bytes.to_vec());
            Ok(())
        }

        fn unbind_storage(&mut self, kind: BufferKind) {
            self.calls.push(Call::Unbind(kind));
            self.bound.remove(&kind.slot());
        }

        fn set_uniforms(&mut self, uniforms: &FrameUniforms) {
            self.calls.push(Call::SetUniforms(*uniforms));
        }

        fn dispatch(&mut self, groups: WorkGroups) -> Result<(), BackendError> {
            self.calls.push(Call::Dispatch(groups));
            self.sync.dispatched();
            Ok(())
        }

        fn barrier(&mut self) -> Result<(), BackendError> {
            if !self.skip_barrier {
                self.calls.push(Call::Barrier);
                self.sync.synchronized();
            }
            Ok(())
        }

        fn present(&mut self) -> Result<(), BackendError> {
            self.sync.begin_present()?;
            self.calls.push(Call::Present);
            Ok(())
        }

        fn release(&mut self) {
            self.calls.push(Call::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_fixed() {
        let slots: Vec<u32> = BufferKind::ALL.iter().map(|kind| kind.slot()).collect();
        assert_eq!(slots, vec![1, 2, 3]);
    }

    #[test]
    fn present_after_dispatch_requires_barrier() {
        let mut sync = FrameSync::new();
        sync.dispatched();
        assert!(matches!(
            sync.begin_present(),
            Err(BackendError::MissingBarrier)
        ));
    }

    #[test]
    fn barrier_clears_pending_dispatch() {
        let mut sync = FrameSync::new();
        assert!(!sync.synchronized());
        sync.dispatched();
        assert!(sync.synchronized());
        assert!(sync.begin_present().is_ok());
        assert!(sync.begin_present().is_ok());
    }
}
