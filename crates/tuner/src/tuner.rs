//! The tuner: registration surface and the evaluation pipeline.

use crate::args::ArgumentStore;
use crate::result::{best_outcome, TuningOutcome};
use crate::verify::difference_norm;
use crate::{report, TuneError};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tunesmith_device::{Device, DeviceError, Element, ScalarValue};
use tunesmith_search::{Annealing, FullSearch, Pso, RandomSearch, Searcher};
use tunesmith_space::{
    define_prelude, Configuration, ConfigurationSpace, DeviceLimits, KernelSpec, ModifierKind,
    NdRange, RangeTarget,
};

/// Number of timed launches per configuration; the reported time is the
/// minimum over these.
const DEFAULT_NUM_RUNS: usize = 4;

/// Default verification tolerance on the accumulated absolute difference.
const DEFAULT_MAX_L2_NORM: f64 = 1e-4;

/// Which strategy drives the configuration selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMethod {
    Full,
    Random {
        fraction: f64,
    },
    Annealing {
        fraction: f64,
        temperature: f64,
    },
    Pso {
        fraction: f64,
        swarm_size: usize,
        inertia: f64,
        cognitive: f64,
        social: f64,
    },
}

/// The auto-tuner. Register kernels, parameters, constraints, and arguments,
/// pick a search method, then call [`tune`](Tuner::tune).
pub struct Tuner {
    device: Box<dyn Device>,
    kernels: Vec<KernelSpec>,
    reference: Option<KernelSpec>,
    arguments: ArgumentStore,
    results: Vec<TuningOutcome>,
    method: SearchMethod,
    search_log: Option<PathBuf>,
    num_runs: usize,
    max_l2_norm: f64,
    search_seed: Option<u64>,
}

impl Tuner {
    pub fn new(device: Box<dyn Device>) -> Self {
        let caps = device.capabilities();
        info!(
            device = %caps.name,
            version = %caps.version,
            "initialized tuner"
        );
        Self {
            device,
            kernels: Vec::new(),
            reference: None,
            arguments: ArgumentStore::new(),
            results: Vec::new(),
            method: SearchMethod::Full,
            search_log: None,
            num_runs: DEFAULT_NUM_RUNS,
            max_l2_norm: DEFAULT_MAX_L2_NORM,
            search_seed: None,
        }
    }

    // ---------------------------------------------------------------- kernels

    /// Loads and concatenates the given source files and registers the
    /// kernel. Returns the kernel id used by the other registration calls.
    pub fn add_kernel<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        entry: &str,
        global: &[usize],
        local: &[usize],
    ) -> Result<usize, TuneError> {
        let source = load_sources(files)?;
        self.add_kernel_from_string(&source, entry, global, local)
    }

    pub fn add_kernel_from_string(
        &mut self,
        source: &str,
        entry: &str,
        global: &[usize],
        local: &[usize],
    ) -> Result<usize, TuneError> {
        let spec = KernelSpec::new(entry, source, NdRange::new(global)?, NdRange::new(local)?);
        self.kernels.push(spec);
        Ok(self.kernels.len() - 1)
    }

    /// Registers the golden-reference kernel; replaces any previous one.
    pub fn set_reference<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        entry: &str,
        global: &[usize],
        local: &[usize],
    ) -> Result<(), TuneError> {
        let source = load_sources(files)?;
        self.set_reference_from_string(&source, entry, global, local)
    }

    pub fn set_reference_from_string(
        &mut self,
        source: &str,
        entry: &str,
        global: &[usize],
        local: &[usize],
    ) -> Result<(), TuneError> {
        self.reference = Some(KernelSpec::new(
            entry,
            source,
            NdRange::new(global)?,
            NdRange::new(local)?,
        ));
        Ok(())
    }

    fn kernel_mut(&mut self, id: usize) -> Result<&mut KernelSpec, TuneError> {
        self.kernels.get_mut(id).ok_or(TuneError::InvalidKernelId(id))
    }

    // ------------------------------------------------------ space declaration

    pub fn add_parameter(
        &mut self,
        id: usize,
        name: &str,
        values: &[usize],
    ) -> Result<(), TuneError> {
        self.kernel_mut(id)?.add_parameter(name, values)?;
        Ok(())
    }

    /// Attaches a constraint; the predicate receives the values of `names`,
    /// in that order.
    pub fn add_constraint(
        &mut self,
        id: usize,
        predicate: impl Fn(&[usize]) -> bool + Send + Sync + 'static,
        names: &[&str],
    ) -> Result<(), TuneError> {
        self.kernel_mut(id)?
            .add_constraint(Arc::new(predicate), names)?;
        Ok(())
    }

    /// Predicts the kernel's local-memory usage in bytes; configurations
    /// exceeding the device limit are dropped.
    pub fn set_local_memory_usage(
        &mut self,
        id: usize,
        model: impl Fn(&[usize]) -> u64 + Send + Sync + 'static,
        names: &[&str],
    ) -> Result<(), TuneError> {
        self.kernel_mut(id)?
            .set_local_memory_model(Arc::new(model), names)?;
        Ok(())
    }

    pub fn mul_local_size(&mut self, id: usize, names: &[&str]) -> Result<(), TuneError> {
        self.add_modifier(id, RangeTarget::Local, ModifierKind::Mul, names)
    }

    pub fn div_local_size(&mut self, id: usize, names: &[&str]) -> Result<(), TuneError> {
        self.add_modifier(id, RangeTarget::Local, ModifierKind::Div, names)
    }

    pub fn mul_global_size(&mut self, id: usize, names: &[&str]) -> Result<(), TuneError> {
        self.add_modifier(id, RangeTarget::Global, ModifierKind::Mul, names)
    }

    pub fn div_global_size(&mut self, id: usize, names: &[&str]) -> Result<(), TuneError> {
        self.add_modifier(id, RangeTarget::Global, ModifierKind::Div, names)
    }

    pub fn set_local_size(&mut self, id: usize, names: &[&str]) -> Result<(), TuneError> {
        self.add_modifier(id, RangeTarget::Local, ModifierKind::Set, names)
    }

    pub fn set_global_size(&mut self, id: usize, names: &[&str]) -> Result<(), TuneError> {
        self.add_modifier(id, RangeTarget::Global, ModifierKind::Set, names)
    }

    fn add_modifier(
        &mut self,
        id: usize,
        target: RangeTarget,
        kind: ModifierKind,
        names: &[&str],
    ) -> Result<(), TuneError> {
        self.kernel_mut(id)?.add_modifier(target, kind, names)?;
        Ok(())
    }

    // -------------------------------------------------------------- arguments

    /// Copies `data` into a read-only device buffer. Arguments receive dense
    /// ordinals in call order, across all argument kinds.
    pub fn add_argument_input<T: Element>(&mut self, data: &[T]) -> Result<usize, TuneError> {
        Ok(self.arguments.add_input(self.device.as_mut(), data)?)
    }

    /// Allocates a read-write output buffer of `len` elements.
    pub fn add_argument_output<T: Element>(&mut self, len: usize) -> Result<usize, TuneError> {
        Ok(self.arguments.add_output::<T>(self.device.as_mut(), len)?)
    }

    pub fn add_argument_scalar(&mut self, value: impl Into<ScalarValue>) -> usize {
        self.arguments.add_scalar(value.into())
    }

    // ----------------------------------------------------------------- search

    pub fn use_full_search(&mut self) {
        self.method = SearchMethod::Full;
    }

    pub fn use_random_search(&mut self, fraction: f64) {
        self.method = SearchMethod::Random { fraction };
    }

    pub fn use_annealing(&mut self, fraction: f64, temperature: f64) {
        self.method = SearchMethod::Annealing {
            fraction,
            temperature,
        };
    }

    pub fn use_pso(
        &mut self,
        fraction: f64,
        swarm_size: usize,
        inertia: f64,
        cognitive: f64,
        social: f64,
    ) {
        self.method = SearchMethod::Pso {
            fraction,
            swarm_size,
            inertia,
            cognitive,
            social,
        };
    }

    /// Writes the per-step search trace to `path` after each kernel's run.
    pub fn output_search_log(&mut self, path: impl Into<PathBuf>) {
        self.search_log = Some(path.into());
    }

    /// Fixes the seed of the stochastic strategies, for reproducible runs.
    pub fn seed_search(&mut self, seed: u64) {
        self.search_seed = Some(seed);
    }

    pub fn set_num_runs(&mut self, runs: usize) {
        self.num_runs = runs.max(1);
    }

    pub fn set_max_l2_norm(&mut self, tolerance: f64) {
        self.max_l2_norm = tolerance;
    }

    // ------------------------------------------------------------- the outer loop

    /// Runs the tuning process: the reference once (snapshotting its
    /// outputs), then every configuration the search strategy selects.
    pub fn tune(&mut self) -> Result<(), TuneError> {
        if self.reference.is_some() && !self.arguments.has_snapshots() {
            self.run_reference()?;
        }

        let limits = self.device.capabilities().limits();
        for id in 0..self.kernels.len() {
            let name = self.kernels[id].name().to_string();
            info!(kernel = %name, "testing kernel");

            if self.kernels[id].parameters().is_empty() {
                self.run_parameterless(id, &limits)?;
                continue;
            }

            let space = self.kernels[id].build_space(&limits);
            if space.is_empty() {
                return Err(TuneError::EmptySpace(name));
            }
            info!(kernel = %name, configurations = space.len(), "enumerated legal set");

            let mut searcher = self.make_searcher(&space);
            let total = searcher.num_visits();
            for step in 0..total {
                let configuration = searcher.next().clone();
                let time_ms = self.evaluate(id, &configuration, &limits, step, total);
                searcher.report(time_ms);
                searcher.advance();
            }

            if let Some(path) = self.search_log.clone() {
                let mut sink = BufWriter::new(File::create(&path)?);
                searcher.write_log(&mut sink)?;
            }
        }
        Ok(())
    }

    /// Evaluates one configuration end to end and records the outcome.
    /// Failures are contained: they record an infinite time and the loop
    /// continues.
    fn evaluate(
        &mut self,
        id: usize,
        configuration: &Configuration,
        limits: &DeviceLimits,
        step: usize,
        total: usize,
    ) -> f64 {
        let name = self.kernels[id].name().to_string();
        let source = format!(
            "{}{}",
            define_prelude(configuration),
            self.kernels[id].source()
        );

        let (time_ms, local_threads) =
            match self.kernels[id].compute_ranges(configuration, limits) {
                Ok((global, local)) => {
                    let local_threads = local.product();
                    match self.run_configuration(&source, &name, &global, &local) {
                        Ok(time) => (time, local_threads),
                        Err(err) => {
                            if let DeviceError::Compile { log } = &err {
                                warn!(kernel = %name, "compiler error/warning:\n{log}");
                            }
                            warn!(kernel = %name, error = %err, step, "configuration failed");
                            (f64::INFINITY, 0)
                        }
                    }
                }
                Err(err) => {
                    warn!(kernel = %name, error = %err, step, "thread ranges infeasible");
                    (f64::INFINITY, 0)
                }
            };

        let verified = if time_ms.is_finite() {
            self.verify_outputs()
        } else {
            false
        };

        if time_ms.is_finite() {
            info!(
                kernel = %name,
                time_ms,
                verified,
                step = step + 1,
                total,
                "completed configuration"
            );
        }

        self.results.push(TuningOutcome {
            kernel: name,
            time_ms,
            local_threads,
            verified,
            configuration: configuration.clone(),
        });
        time_ms
    }

    fn run_parameterless(&mut self, id: usize, limits: &DeviceLimits) -> Result<(), TuneError> {
        let name = self.kernels[id].name().to_string();
        let source = self.kernels[id].source().to_string();
        let (global, local) = {
            let (g, l) = self.kernels[id].base_ranges();
            (g.clone(), l.clone())
        };
        limits.check_ranges(&global, &local)?;

        let (time_ms, local_threads) =
            match self.run_configuration(&source, &name, &global, &local) {
                Ok(time) => (time, local.product()),
                Err(err) => {
                    warn!(kernel = %name, error = %err, "kernel failed");
                    (f64::INFINITY, 0)
                }
            };
        let verified = time_ms.is_finite() && self.verify_outputs();
        self.results.push(TuningOutcome {
            kernel: name,
            time_ms,
            local_threads,
            verified,
            configuration: Vec::new(),
        });
        Ok(())
    }

    fn run_reference(&mut self) -> Result<(), TuneError> {
        let reference = self.reference.as_ref().expect("reference registered");
        let name = reference.name().to_string();
        let source = reference.source().to_string();
        let (global, local) = {
            let (g, l) = reference.base_ranges();
            (g.clone(), l.clone())
        };
        info!(kernel = %name, "running reference");

        match self.run_configuration(&source, &name, &global, &local) {
            Ok(time_ms) => {
                self.arguments.take_snapshots(self.device.as_ref())?;
                info!(kernel = %name, time_ms, "reference output captured");
            }
            Err(err) => {
                warn!(
                    kernel = %name,
                    error = %err,
                    "reference kernel failed; verification is disabled"
                );
            }
        }
        Ok(())
    }

    /// Compile, bind, reset, check local memory, and launch `num_runs`
    /// times; the reported time is the minimum over the launches.
    fn run_configuration(
        &mut self,
        source: &str,
        entry: &str,
        global: &NdRange,
        local: &NdRange,
    ) -> Result<f64, DeviceError> {
        let program = self.device.compile(source)?;
        let outcome = (|| {
            let kernel = self.device.create_kernel(program, entry)?;
            self.arguments.bind(self.device.as_mut(), kernel)?;
            self.arguments.reset_outputs(self.device.as_mut())?;

            let needed = self.device.local_memory_usage(kernel)?;
            let limit = self.device.capabilities().local_memory_bytes;
            if needed > limit {
                return Err(DeviceError::LocalMemoryExceeded { needed, limit });
            }

            let mut best = f64::INFINITY;
            for _ in 0..self.num_runs {
                let elapsed = self.device.launch(kernel, global.sizes(), local.sizes())?;
                best = best.min(elapsed);
            }
            Ok(best)
        })();
        self.device.release_program(program);
        outcome
    }

    /// Compares every output buffer against its reference snapshot.
    fn verify_outputs(&self) -> bool {
        if !self.arguments.has_snapshots() {
            return true;
        }
        let mut ok = true;
        for output in self.arguments.outputs() {
            let Some(reference) = &output.snapshot else {
                continue;
            };
            let mut bytes = vec![0u8; output.byte_len()];
            if let Err(err) = self.device.read_buffer(output.buffer, &mut bytes) {
                warn!(ordinal = output.ordinal, error = %err, "output readback failed");
                ok = false;
                continue;
            }
            let norm = difference_norm(output.elem, reference, &bytes);
            if norm.is_nan() || norm > self.max_l2_norm {
                warn!(
                    ordinal = output.ordinal,
                    norm,
                    tolerance = self.max_l2_norm,
                    "results differ from the reference"
                );
                ok = false;
            }
        }
        ok
    }

    fn make_searcher(&self, space: &Arc<ConfigurationSpace>) -> Box<dyn Searcher> {
        let space = Arc::clone(space);
        match self.method {
            SearchMethod::Full => Box::new(FullSearch::new(space)),
            SearchMethod::Random { fraction } => Box::new(match self.search_seed {
                Some(seed) => RandomSearch::with_seed(space, fraction, seed),
                None => RandomSearch::new(space, fraction),
            }),
            SearchMethod::Annealing {
                fraction,
                temperature,
            } => Box::new(match self.search_seed {
                Some(seed) => Annealing::with_seed(space, fraction, temperature, seed),
                None => Annealing::new(space, fraction, temperature),
            }),
            SearchMethod::Pso {
                fraction,
                swarm_size,
                inertia,
                cognitive,
                social,
            } => Box::new(match self.search_seed {
                Some(seed) => Pso::with_seed(
                    space, fraction, swarm_size, inertia, cognitive, social, seed,
                ),
                None => Pso::new(space, fraction, swarm_size, inertia, cognitive, social),
            }),
        }
    }

    // ---------------------------------------------------------------- results

    pub fn results(&self) -> &[TuningOutcome] {
        &self.results
    }

    pub fn best(&self) -> Option<&TuningOutcome> {
        best_outcome(&self.results)
    }

    /// Prints the verified results and the best entry; returns the best time.
    pub fn print_to_screen(&self) -> f64 {
        report::print_to_screen(&self.results)
    }

    pub fn print_to_file(&self, path: impl AsRef<Path>) -> Result<(), TuneError> {
        Ok(report::write_csv(&self.results, path.as_ref())?)
    }

    pub fn print_json(
        &self,
        path: impl AsRef<Path>,
        extra: &[(&str, &str)],
    ) -> Result<(), TuneError> {
        Ok(report::write_json(&self.results, path.as_ref(), extra)?)
    }
}

fn load_sources<P: AsRef<Path>>(files: &[P]) -> Result<String, TuneError> {
    let mut source = String::new();
    for file in files {
        let path = file.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| TuneError::SourceIo {
            path: path.to_path_buf(),
            source: err,
        })?;
        source.push_str(&text);
    }
    Ok(source)
}
