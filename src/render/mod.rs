pub mod gpu;
pub mod kernel;

pub use gpu::GpuBackend;
