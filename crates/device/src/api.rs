//! The capability boundary the tuner core consumes.

use crate::element::{Complex32, Complex64};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tunesmith_space::DeviceLimits;

/// Handle to a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u64);

/// Handle to an instantiated kernel within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub(crate) u64);

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    ReadWrite,
}

/// A scalar kernel argument, stored by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int32(i32),
    SizeT(u64),
    Float32(f32),
    Float64(f64),
    Complex32(Complex32),
    Complex64(Complex64),
}

impl ScalarValue {
    /// Little-endian byte image, as handed to the kernel ABI.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ScalarValue::Int32(v) => v.to_le_bytes().to_vec(),
            ScalarValue::SizeT(v) => v.to_le_bytes().to_vec(),
            ScalarValue::Float32(v) => v.to_le_bytes().to_vec(),
            ScalarValue::Float64(v) => v.to_le_bytes().to_vec(),
            ScalarValue::Complex32(v) => bytemuck::bytes_of(v).to_vec(),
            ScalarValue::Complex64(v) => bytemuck::bytes_of(v).to_vec(),
        }
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int32(v)
    }
}
impl From<usize> for ScalarValue {
    fn from(v: usize) -> Self {
        ScalarValue::SizeT(v as u64)
    }
}
impl From<u64> for ScalarValue {
    fn from(v: u64) -> Self {
        ScalarValue::SizeT(v)
    }
}
impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::Float32(v)
    }
}
impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}
impl From<Complex32> for ScalarValue {
    fn from(v: Complex32) -> Self {
        ScalarValue::Complex32(v)
    }
}
impl From<Complex64> for ScalarValue {
    fn from(v: Complex64) -> Self {
        ScalarValue::Complex64(v)
    }
}

/// One positional kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Buffer(BufferId),
    Scalar(ScalarValue),
}

/// Static device properties the tuner queries up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub name: String,
    pub version: String,
    pub max_work_group_size: usize,
    pub max_work_item_sizes: [usize; 3],
    pub max_work_item_dimensions: usize,
    pub local_memory_bytes: u64,
}

impl DeviceCapabilities {
    pub fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_work_group_size: self.max_work_group_size,
            max_work_item_sizes: self.max_work_item_sizes,
            max_work_item_dimensions: self.max_work_item_dimensions,
            local_memory_bytes: self.local_memory_bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("program build failed:\n{log}")]
    Compile { log: String },

    #[error("program produced an invalid binary")]
    InvalidBinary,

    #[error("entry point '{0}' not found")]
    UnknownEntryPoint(String),

    #[error("kernel launch failed: {0}")]
    Launch(String),

    #[error("kernel requires {needed} bytes of local memory, device has {limit}")]
    LocalMemoryExceeded { needed: u64, limit: u64 },

    #[error("stale or unknown {kind} handle")]
    InvalidHandle { kind: &'static str },

    #[error("argument index {index} is not bound")]
    UnboundArgument { index: usize },

    #[error("buffer access out of range: {0}")]
    OutOfRange(String),

    #[error("device initialisation failed: {0}")]
    Init(String),

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// What the tuner needs from a compute device: run-time compilation of
/// kernel source, buffers, positional argument binding, and synchronous,
/// profiled launches. All device work is ordered on one queue; every call
/// completes before returning.
pub trait Device {
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Compiles assembled kernel source. A failed build reports the
    /// compiler log through [`DeviceError::Compile`].
    fn compile(&mut self, source: &str) -> Result<ProgramId, DeviceError>;

    fn create_kernel(&mut self, program: ProgramId, entry: &str) -> Result<KernelId, DeviceError>;

    /// Compiler-reported local memory usage of the built kernel, in bytes.
    fn local_memory_usage(&self, kernel: KernelId) -> Result<u64, DeviceError>;

    fn create_buffer(&mut self, bytes: usize, access: BufferAccess)
        -> Result<BufferId, DeviceError>;

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), DeviceError>;

    fn read_buffer(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), DeviceError>;

    fn set_argument(
        &mut self,
        kernel: KernelId,
        index: usize,
        arg: KernelArg,
    ) -> Result<(), DeviceError>;

    /// Launches the kernel over the given ranges, waits for completion, and
    /// returns the profiled elapsed time in milliseconds.
    fn launch(
        &mut self,
        kernel: KernelId,
        global: &[usize],
        local: &[usize],
    ) -> Result<f64, DeviceError>;

    /// Releases a program and any kernels created from it.
    fn release_program(&mut self, program: ProgramId);
}
