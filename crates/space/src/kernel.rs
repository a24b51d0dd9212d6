//! Kernel descriptions and the enumeration of their legal configurations.

use crate::constraint::{Constraint, ConstraintFn, LocalMemoryFn, LocalMemoryModel};
use crate::parameter::{Configuration, Parameter, Setting};
use crate::range::{DeviceLimits, ModifierKind, NdRange, RangeModifier, RangeTarget};
use crate::SpaceError;
use std::collections::HashMap;
use std::sync::Arc;

/// The enumerated legal set of one kernel, addressable by index. Searchers
/// treat this as an opaque indexed collection; the value-vector lookup is
/// what lets neighborhood-based strategies stay inside the legal set.
#[derive(Debug)]
pub struct ConfigurationSpace {
    parameters: Vec<Parameter>,
    configurations: Vec<Configuration>,
    by_values: HashMap<Vec<usize>, usize>,
}

impl ConfigurationSpace {
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn get(&self, index: usize) -> &Configuration {
        &self.configurations[index]
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    /// The parameters the space was generated from, in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Looks up the index of a configuration given its value vector in
    /// parameter declaration order. `None` means the combination was
    /// filtered out (or never existed).
    pub fn position_of(&self, values: &[usize]) -> Option<usize> {
        self.by_values.get(values).copied()
    }

    /// The value vector of the configuration at `index`.
    pub fn values_at(&self, index: usize) -> Vec<usize> {
        self.configurations[index]
            .iter()
            .map(|setting| setting.value)
            .collect()
    }
}

/// Everything known about one tunable kernel: source, entry point, base
/// thread ranges, parameters, constraints, and range modifiers. The legal
/// configuration set is materialized once on first use and reused afterwards.
pub struct KernelSpec {
    name: String,
    source: String,
    global_base: NdRange,
    local_base: NdRange,
    parameters: Vec<Parameter>,
    constraints: Vec<Constraint>,
    local_memory: Option<LocalMemoryModel>,
    modifiers: Vec<RangeModifier>,
    space: Option<Arc<ConfigurationSpace>>,
}

impl KernelSpec {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        global: NdRange,
        local: NdRange,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            global_base: global,
            local_base: local,
            parameters: Vec::new(),
            constraints: Vec::new(),
            local_memory: None,
            modifiers: Vec::new(),
            space: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    pub fn base_ranges(&self) -> (&NdRange, &NdRange) {
        (&self.global_base, &self.local_base)
    }

    /// Declares a tuning parameter. Names must be unique within the kernel.
    pub fn add_parameter(&mut self, name: &str, values: &[usize]) -> Result<(), SpaceError> {
        if self.has_parameter(name) {
            return Err(SpaceError::DuplicateParameter(name.to_string()));
        }
        if values.is_empty() {
            return Err(SpaceError::EmptyValueList(name.to_string()));
        }
        self.parameters.push(Parameter::new(name, values));
        Ok(())
    }

    /// Attaches a boolean constraint over previously declared parameters.
    pub fn add_constraint(
        &mut self,
        predicate: ConstraintFn,
        names: &[&str],
    ) -> Result<(), SpaceError> {
        let (names, indices) = self.resolve(names)?;
        self.constraints.push(Constraint::new(predicate, names, indices));
        Ok(())
    }

    /// Installs the local-memory byte model; replaces any previous model.
    pub fn set_local_memory_model(
        &mut self,
        model: LocalMemoryFn,
        names: &[&str],
    ) -> Result<(), SpaceError> {
        let (names, indices) = self.resolve(names)?;
        self.local_memory = Some(LocalMemoryModel::new(model, names, indices));
        Ok(())
    }

    /// Appends a thread-range modifier; modifiers apply in declaration order.
    pub fn add_modifier(
        &mut self,
        target: RangeTarget,
        kind: ModifierKind,
        names: &[&str],
    ) -> Result<(), SpaceError> {
        for name in names {
            if !self.has_parameter(name) {
                return Err(SpaceError::UnknownParameter(name.to_string()));
            }
        }
        let dims = match target {
            RangeTarget::Global => self.global_base.dims(),
            RangeTarget::Local => self.local_base.dims(),
        };
        if names.len() > dims {
            return Err(SpaceError::ModifierOutOfRange {
                names: names.len(),
                target,
                dims,
            });
        }
        self.modifiers.push(RangeModifier::new(target, kind, names));
        Ok(())
    }

    fn resolve(&self, names: &[&str]) -> Result<(Vec<String>, Vec<usize>), SpaceError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let index = self
                .parameters
                .iter()
                .position(|p| p.name == *name)
                .ok_or_else(|| SpaceError::UnknownParameter(name.to_string()))?;
            indices.push(index);
        }
        Ok((names.iter().map(|n| n.to_string()).collect(), indices))
    }

    /// Materializes the legal configuration set: the Cartesian product of all
    /// parameter values in lexicographic order over declaration order,
    /// filtered by constraints, the local-memory model, and thread-range
    /// feasibility. Built once; later calls return the cached set.
    pub fn build_space(&mut self, limits: &DeviceLimits) -> Arc<ConfigurationSpace> {
        if let Some(space) = &self.space {
            return Arc::clone(space);
        }

        let mut configurations = Vec::new();
        let mut by_values = HashMap::new();
        let mut odometer = vec![0usize; self.parameters.len()];

        'enumerate: loop {
            let values: Vec<usize> = odometer
                .iter()
                .enumerate()
                .map(|(p, &v)| self.parameters[p].values[v])
                .collect();

            if self.admits(&values, limits) {
                let configuration: Configuration = self
                    .parameters
                    .iter()
                    .zip(&values)
                    .map(|(p, &v)| Setting::new(p.name.clone(), v))
                    .collect();
                by_values.insert(values, configurations.len());
                configurations.push(configuration);
            }

            // Advance the odometer; the last-declared parameter varies fastest.
            for p in (0..odometer.len()).rev() {
                odometer[p] += 1;
                if odometer[p] < self.parameters[p].values.len() {
                    continue 'enumerate;
                }
                odometer[p] = 0;
            }
            break;
        }

        let space = Arc::new(ConfigurationSpace {
            parameters: self.parameters.clone(),
            configurations,
            by_values,
        });
        self.space = Some(Arc::clone(&space));
        space
    }

    fn admits(&self, values: &[usize], limits: &DeviceLimits) -> bool {
        for constraint in &self.constraints {
            if !constraint.holds(values) {
                return false;
            }
        }
        if let Some(model) = &self.local_memory {
            if model.bytes(values) > limits.local_memory_bytes {
                return false;
            }
        }
        self.ranges_for(values, limits).is_ok()
    }

    /// Computes the global/local thread ranges for one configuration by
    /// applying the modifiers, in declaration order, to the base ranges.
    pub fn compute_ranges(
        &self,
        configuration: &Configuration,
        limits: &DeviceLimits,
    ) -> Result<(NdRange, NdRange), SpaceError> {
        let values: Vec<usize> = configuration.iter().map(|s| s.value).collect();
        self.ranges_for(&values, limits)
    }

    fn ranges_for(
        &self,
        values: &[usize],
        limits: &DeviceLimits,
    ) -> Result<(NdRange, NdRange), SpaceError> {
        let mut global = self.global_base.clone();
        let mut local = self.local_base.clone();

        for modifier in &self.modifiers {
            let range = match modifier.target {
                RangeTarget::Global => &mut global,
                RangeTarget::Local => &mut local,
            };
            for (dim, name) in modifier.names.iter().enumerate() {
                let index = self
                    .parameters
                    .iter()
                    .position(|p| p.name == *name)
                    .ok_or_else(|| SpaceError::UnknownParameter(name.clone()))?;
                let value = values[index];
                match modifier.kind {
                    ModifierKind::Mul => range.set(dim, range.get(dim) * value),
                    ModifierKind::Div => {
                        if value == 0 {
                            return Err(SpaceError::DivisionByZero {
                                target: modifier.target,
                                name: name.clone(),
                            });
                        }
                        range.set(dim, range.get(dim) / value);
                    }
                    ModifierKind::Set => range.set(dim, value),
                }
            }
        }

        limits.check_ranges(&global, &local)?;
        Ok((global, local))
    }
}

impl std::fmt::Debug for KernelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelSpec")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("modifiers", &self.modifiers.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}
