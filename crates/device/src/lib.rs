//! Device abstraction for the tuner: run-time source compilation, buffers,
//! argument binding, and profiled kernel launches.
//!
//! The tuner core only sees the [`Device`] trait. Two implementations live
//! here: [`HostDevice`], an in-process simulator driven by registered Rust
//! closures, and (behind the `cuda` feature) `CudaDevice`, which compiles
//! CUDA C with NVRTC and launches through the driver API.

mod api;
mod element;
mod host;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use api::{
    BufferAccess, BufferId, Device, DeviceCapabilities, DeviceError, KernelArg, KernelId,
    ProgramId, ScalarValue,
};
pub use element::{Complex32, Complex64, ElemType, Element};
pub use host::{Defines, HostDevice, HostKernel, LaunchContext};
