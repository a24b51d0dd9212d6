//! An in-process device simulator.
//!
//! Kernels are Rust closures registered per entry point. "Compiling" a
//! source string parses the `#define` prelude the tuner prepends, so a
//! registered kernel sees exactly the settings of the configuration under
//! evaluation, plus the launch ranges and typed views over the buffers it
//! was bound. Per-entry hooks model compiler-reported local memory and,
//! optionally, a synthetic cost landscape; without a cost model the launch
//! reports wall-clock time of the closure.

use crate::api::{
    BufferAccess, BufferId, Device, DeviceCapabilities, DeviceError, KernelArg, KernelId,
    ProgramId, ScalarValue,
};
use crate::element::Element;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Integer defines parsed from the assembled source, by name.
pub type Defines = BTreeMap<String, i64>;

type KernelBody = Arc<dyn Fn(&LaunchContext<'_>) -> Result<(), DeviceError> + Send + Sync>;
type DefineHook<T> = Arc<dyn Fn(&Defines) -> T + Send + Sync>;

/// A host-side kernel implementation plus its per-configuration hooks.
#[derive(Clone)]
pub struct HostKernel {
    body: KernelBody,
    local_memory: Option<DefineHook<u64>>,
    cost_model: Option<DefineHook<f64>>,
}

impl HostKernel {
    pub fn new(
        body: impl Fn(&LaunchContext<'_>) -> Result<(), DeviceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            body: Arc::new(body),
            local_memory: None,
            cost_model: None,
        }
    }

    /// Models the compiler-reported local-memory usage in bytes.
    pub fn with_local_memory(
        mut self,
        model: impl Fn(&Defines) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.local_memory = Some(Arc::new(model));
        self
    }

    /// Reports a synthetic elapsed time (milliseconds) instead of the
    /// measured wall-clock time of the closure.
    pub fn with_cost_model(
        mut self,
        model: impl Fn(&Defines) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.cost_model = Some(Arc::new(model));
        self
    }
}

struct HostProgram {
    defines: Defines,
    source: String,
}

struct KernelInstance {
    program: u64,
    entry: String,
    args: BTreeMap<usize, KernelArg>,
}

/// Backing store is u64 words so every supported element type is aligned.
struct HostBuffer {
    words: RefCell<Vec<u64>>,
    len_bytes: usize,
    #[allow(dead_code)]
    access: BufferAccess,
}

impl HostBuffer {
    fn new(len_bytes: usize, access: BufferAccess) -> Self {
        let words = len_bytes.div_ceil(8);
        Self {
            words: RefCell::new(vec![0u64; words]),
            len_bytes,
            access,
        }
    }
}

pub struct HostDevice {
    caps: DeviceCapabilities,
    registry: HashMap<String, HostKernel>,
    programs: HashMap<u64, HostProgram>,
    kernels: HashMap<u64, KernelInstance>,
    buffers: HashMap<u64, HostBuffer>,
    next_id: u64,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            name: "tunesmith host simulator".into(),
            version: "sim 1.0".into(),
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024, 64],
            max_work_item_dimensions: 3,
            local_memory_bytes: 48 * 1024,
        })
    }

    pub fn with_capabilities(caps: DeviceCapabilities) -> Self {
        Self {
            caps,
            registry: HashMap::new(),
            programs: HashMap::new(),
            kernels: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers the host implementation for an entry point.
    pub fn register_kernel(&mut self, entry: impl Into<String>, kernel: HostKernel) {
        self.registry.insert(entry.into(), kernel);
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn parse_defines(source: &str) -> Result<Defines, DeviceError> {
        let mut defines = Defines::new();
        let mut log = String::new();
        for (line_no, line) in source.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("#error") {
                log.push_str(&format!("{}: error directive: {}\n", line_no + 1, trimmed));
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("#define ") {
                let mut parts = rest.split_whitespace();
                if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
                    if let Ok(value) = value.parse::<i64>() {
                        defines.insert(name.to_string(), value);
                    }
                }
            }
        }
        if log.is_empty() {
            Ok(defines)
        } else {
            Err(DeviceError::Compile { log })
        }
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for HostDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn compile(&mut self, source: &str) -> Result<ProgramId, DeviceError> {
        let defines = Self::parse_defines(source)?;
        tracing::debug!(defines = defines.len(), "compiled simulator program");
        let id = self.fresh_id();
        self.programs.insert(
            id,
            HostProgram {
                defines,
                source: source.to_string(),
            },
        );
        Ok(ProgramId(id))
    }

    fn create_kernel(&mut self, program: ProgramId, entry: &str) -> Result<KernelId, DeviceError> {
        if !self.programs.contains_key(&program.0) {
            return Err(DeviceError::InvalidHandle { kind: "program" });
        }
        if !self.registry.contains_key(entry) {
            return Err(DeviceError::UnknownEntryPoint(entry.to_string()));
        }
        let id = self.fresh_id();
        self.kernels.insert(
            id,
            KernelInstance {
                program: program.0,
                entry: entry.to_string(),
                args: BTreeMap::new(),
            },
        );
        Ok(KernelId(id))
    }

    fn local_memory_usage(&self, kernel: KernelId) -> Result<u64, DeviceError> {
        let instance = self
            .kernels
            .get(&kernel.0)
            .ok_or(DeviceError::InvalidHandle { kind: "kernel" })?;
        let program = self
            .programs
            .get(&instance.program)
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;
        let registered = self
            .registry
            .get(&instance.entry)
            .ok_or_else(|| DeviceError::UnknownEntryPoint(instance.entry.clone()))?;
        Ok(registered
            .local_memory
            .as_ref()
            .map_or(0, |model| model(&program.defines)))
    }

    fn create_buffer(
        &mut self,
        bytes: usize,
        access: BufferAccess,
    ) -> Result<BufferId, DeviceError> {
        let id = self.fresh_id();
        self.buffers.insert(id, HostBuffer::new(bytes, access));
        Ok(BufferId(id))
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), DeviceError> {
        let buf = self
            .buffers
            .get(&buffer.0)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        if data.len() > buf.len_bytes {
            return Err(DeviceError::OutOfRange(format!(
                "write of {} bytes into a {}-byte buffer",
                data.len(),
                buf.len_bytes
            )));
        }
        let mut words = buf.words.borrow_mut();
        bytemuck::cast_slice_mut::<u64, u8>(&mut words)[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), DeviceError> {
        let buf = self
            .buffers
            .get(&buffer.0)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        if out.len() > buf.len_bytes {
            return Err(DeviceError::OutOfRange(format!(
                "read of {} bytes from a {}-byte buffer",
                out.len(),
                buf.len_bytes
            )));
        }
        let words = buf.words.borrow();
        out.copy_from_slice(&bytemuck::cast_slice::<u64, u8>(&words)[..out.len()]);
        Ok(())
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
        let program = self
            .programs
            .get(&instance.program)
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;
        let registered = self
            .registry
            .get(&instance.entry)
            .ok_or_else(|| DeviceError::UnknownEntryPoint(instance.entry.clone()))?;

        if local.iter().product::<usize>() == 0 {
            return Err(DeviceError::Launch("zero-sized local range".into()));
        }

        let context = LaunchContext {
            defines: &program.defines,
            source: &program.source,
            global,
            local,
            args: &instance.args,
            buffers: &self.buffers,
        };

        let started = Instant::now();
        (registered.body)(&context)?;
        let measured_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(registered
            .cost_model
            .as_ref()
            .map_or(measured_ms, |model| model(&program.defines)))
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        self.kernels
            .retain(|_, instance| instance.program != program.0);
    }
}

/// Everything a host kernel sees for one launch.
pub struct LaunchContext<'a> {
    pub defines: &'a Defines,
    pub source: &'a str,
    pub global: &'a [usize],
    pub local: &'a [usize],
    args: &'a BTreeMap<usize, KernelArg>,
    buffers: &'a HashMap<u64, HostBuffer>,
}

impl<'a> LaunchContext<'a> {
    pub fn define(&self, name: &str) -> Option<i64> {
        self.defines.get(name).copied()
    }

    pub fn define_or(&self, name: &str, default: i64) -> i64 {
        self.define(name).unwrap_or(default)
    }

    pub fn scalar(&self, index: usize) -> Result<ScalarValue, DeviceError> {
        match self.args.get(&index) {
            Some(KernelArg::Scalar(value)) => Ok(*value),
            Some(KernelArg::Buffer(_)) | None => Err(DeviceError::UnboundArgument { index }),
        }
    }

    pub fn int(&self, index: usize) -> Result<i32, DeviceError> {
        match self.scalar(index)? {
            ScalarValue::Int32(v) => Ok(v),
            other => Err(DeviceError::OutOfRange(format!(
                "argument {index} is not an i32 scalar: {other:?}"
            ))),
        }
    }

    fn buffer_at(&self, index: usize) -> Result<&'a HostBuffer, DeviceError> {
        match self.args.get(&index) {
            Some(KernelArg::Buffer(id)) => self
                .buffers
                .get(&id.0)
                .ok_or(DeviceError::InvalidHandle { kind: "buffer" }),
            Some(KernelArg::Scalar(_)) | None => Err(DeviceError::UnboundArgument { index }),
        }
    }

    /// Read-only typed view of the buffer bound at `index`.
    pub fn input<T: Element>(&self, index: usize) -> Result<Ref<'a, [T]>, DeviceError> {
        let buf = self.buffer_at(index)?;
        let elements = buf.len_bytes / std::mem::size_of::<T>();
        Ok(Ref::map(buf.words.borrow(), |words| {
            &bytemuck::cast_slice::<u64, T>(words)[..elements]
        }))
    }

    /// Mutable typed view of the buffer bound at `index`.
    pub fn output<T: Element>(&self, index: usize) -> Result<RefMut<'a, [T]>, DeviceError> {
        let buf = self.buffer_at(index)?;
        let elements = buf.len_bytes / std::mem::size_of::<T>();
        Ok(RefMut::map(buf.words.borrow_mut(), |words| {
            &mut bytemuck::cast_slice_mut::<u64, T>(words)[..elements]
        }))
    }
}
