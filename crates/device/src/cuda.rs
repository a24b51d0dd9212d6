//! CUDA backend: NVRTC source compilation and driver-API launches.
//!
//! The assembled kernel source (the `#define` prelude plus CUDA C) is
//! compiled with NVRTC at run time, loaded as PTX, and launched on the
//! primary stream. Launches are timed by bracketing with synchronization,
//! so the reported milliseconds cover the kernel alone.

use crate::api::{
    BufferAccess, BufferId, Device, DeviceCapabilities, DeviceError, KernelArg, KernelId,
    ProgramId,
};
use cudarc::driver::{CudaDevice as DriverDevice, CudaFunction, CudaSlice, DevicePtr, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::{compile_ptx, Ptx};
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::sync::Arc;
use std::time::Instant;

struct CudaProgram {
    /// Taken when the kernel is instantiated; one entry point per program.
    ptx: Option<Ptx>,
}

struct KernelInstance {
    program: u64,
    function: CudaFunction,
    args: BTreeMap<usize, KernelArg>,
}

pub struct CudaDevice {
    device: Arc<DriverDevice>,
    caps: DeviceCapabilities,
    programs: HashMap<u64, CudaProgram>,
    kernels: HashMap<u64, KernelInstance>,
    buffers: HashMap<u64, CudaSlice<u8>>,
    next_id: u64,
}

impl CudaDevice {
    pub fn new(ordinal: usize) -> Result<Self, DeviceError> {
        let device = DriverDevice::new(ordinal)
            .map_err(|e| DeviceError::Init(format!("CUDA device {ordinal}: {e}")))?;

        // The driver wrapper exposes few property queries; these match the
        // guaranteed minima of every compute-7.x+ part.
        let caps = DeviceCapabilities {
            name: format!("CUDA device {ordinal}"),
            version: "CUDA".into(),
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024, 64],
            max_work_item_dimensions: 3,
            local_memory_bytes: 48 * 1024,
        };

        Ok(Self {
            device,
            caps,
            programs: HashMap::new(),
            kernels: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
        })
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Device for CudaDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn compile(&mut self, source: &str) -> Result<ProgramId, DeviceError> {
        let ptx = compile_ptx(source).map_err(|e| DeviceError::Compile {
            log: e.to_string(),
        })?;
        let id = self.fresh_id();
        self.programs.insert(id, CudaProgram { ptx: Some(ptx) });
        Ok(ProgramId(id))
    }

    fn create_kernel(&mut self, program: ProgramId, entry: &str) -> Result<KernelId, DeviceError> {
        let slot = self
            .programs
            .get_mut(&program.0)
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;
        let ptx = slot
            .ptx
            .take()
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;

        // The loader requires 'static names; modules are keyed per program.
        let module: &'static str =
            Box::leak(format!("tunesmith_module_{}", program.0).into_boxed_str());
        let func: &'static str = Box::leak(entry.to_string().into_boxed_str());

        self.device
            .load_ptx(ptx, module, &[func])
            .map_err(|e| DeviceError::Compile {
                log: format!("PTX load failed: {e}"),
            })?;
        let function = self
            .device
            .get_func(module, func)
            .ok_or_else(|| DeviceError::UnknownEntryPoint(entry.to_string()))?;

        let id = self.fresh_id();
        self.kernels.insert(
            id,
            KernelInstance {
                program: program.0,
                function,
                args: BTreeMap::new(),
            },
        );
        Ok(KernelId(id))
    }

    fn local_memory_usage(&self, kernel: KernelId) -> Result<u64, DeviceError> {
        if !self.kernels.contains_key(&kernel.0) {
            return Err(DeviceError::InvalidHandle { kind: "kernel" });
        }
        // The safe driver wrapper has no shared-size attribute query; the
        // enumeration-time local-memory model remains the effective guard.
        Ok(0)
    }

    fn create_buffer(
        &mut self,
        bytes: usize,
        _access: BufferAccess,
    ) -> Result<BufferId, DeviceError> {
        let slice = self
            .device
            .alloc_zeros::<u8>(bytes)
            .map_err(|e| DeviceError::Launch(format!("allocation of {bytes} bytes failed: {e}")))?;
        let id = self.fresh_id();
        self.buffers.insert(id, slice);
        Ok(BufferId(id))
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), DeviceError> {
        let slice = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        if data.len() != slice.len() {
            return Err(DeviceError::OutOfRange(format!(
                "write of {} bytes into a {}-byte buffer",
                data.len(),
                slice.len()
            )));
        }
        self.device
            .htod_sync_copy_into(data, slice)
            .map_err(|e| DeviceError::Launch(format!("host-to-device copy failed: {e}")))
    }

    fn read_buffer(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), DeviceError> {
        let slice = self
            .buffers
            .get(&buffer.0)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        if out.len() != slice.len() {
            return Err(DeviceError::OutOfRange(format!(
                "read of {} bytes from a {}-byte buffer",
                out.len(),
                slice.len()
            )));
        }
        self.device
            .dtoh_sync_copy_into(slice, out)
            .map_err(|e| DeviceError::Launch(format!("device-to-host copy failed: {e}")))
    }

    fn set_argument(
        &mut self,
        kernel: KernelId,
        index: usize,
        arg: KernelArg,
    ) -> Result<(), DeviceError> {
        let instance = self
            .kernels
            .get_mut(&kernel.0)
            .ok_or(DeviceError::InvalidHandle { kind: "kernel" })?;
        instance.args.insert(index, arg);
        Ok(())
    }

    fn launch(
        &mut self,
        kernel: KernelId,
        global: &[usize],
        local: &[usize],
    ) -> Result<f64, DeviceError> {
        let instance = self
            .kernels
            .get(&kernel.0)
            .ok_or(DeviceError::InvalidHandle { kind: "kernel" })?;

        let mut block = [1u32; 3];
        let mut grid = [1u32; 3];
        for dim in 0..local.len().min(3) {
            block[dim] = local[dim] as u32;
            // Global counts threads; the grid is counted in blocks.
            grid[dim] = (global.get(dim).copied().unwrap_or(1) / local[dim].max(1)) as u32;
        }
        let config = LaunchConfig {
            grid_dim: (grid[0].max(1), grid[1].max(1), grid[2].max(1)),
            block_dim: (block[0].max(1), block[1].max(1), block[2].max(1)),
            shared_mem_bytes: 0,
        };

        // Kernel parameters are passed as an array of host pointers to each
        // argument value; the backing storage must outlive the launch.
        let mut device_ptrs: Vec<Box<u64>> = Vec::new();
        let mut scalar_bytes: Vec<Vec<u8>> = Vec::new();
        let mut args: Vec<*mut c_void> = Vec::with_capacity(instance.args.len());
        for arg in instance.args.values() {
            match arg {
                KernelArg::Buffer(id) => {
                    let slice = self
                        .buffers
                        .get(&id.0)
                        .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
                    device_ptrs.push(Box::new(*slice.device_ptr()));
                    let stored = device_ptrs.last().unwrap();
                    args.push(&**stored as *const u64 as *mut c_void);
                }
                KernelArg::Scalar(value) => {
                    scalar_bytes.push(value.to_bytes());
                    let stored = scalar_bytes.last().unwrap();
                    args.push(stored.as_ptr() as *mut c_void);
                }
            }
        }

        self.device
            .synchronize()
            .map_err(|e| DeviceError::Launch(format!("pre-launch synchronize failed: {e}")))?;
        let started = Instant::now();
        unsafe {
            instance
                .function
                .clone()
                .launch(config, &mut args)
                .map_err(|e| DeviceError::Launch(e.to_string()))?;
        }
        self.device
            .synchronize()
            .map_err(|e| DeviceError::Launch(format!("post-launch synchronize failed: {e}")))?;
        Ok(started.elapsed().as_secs_f64() * 1000.0)
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        self.kernels
            .retain(|_, instance| instance.program != program.0);
    }
}
