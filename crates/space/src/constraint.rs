//! User predicates over named subsets of parameters.

use std::sync::Arc;

/// Boolean predicate over parameter values, in the order the constraint
/// declared the parameter names.
pub type ConstraintFn = Arc<dyn Fn(&[usize]) -> bool + Send + Sync>;

/// Byte-count function for the local-memory model.
pub type LocalMemoryFn = Arc<dyn Fn(&[usize]) -> u64 + Send + Sync>;

/// A constraint binds a predicate to a list of parameter names. Name
/// resolution to parameter indices happens once, at registration.
#[derive(Clone)]
pub struct Constraint {
    pub(crate) predicate: ConstraintFn,
    pub(crate) names: Vec<String>,
    pub(crate) indices: Vec<usize>,
}

impl Constraint {
    pub(crate) fn new(predicate: ConstraintFn, names: Vec<String>, indices: Vec<usize>) -> Self {
        Self {
            predicate,
            names,
            indices,
        }
    }

    /// Evaluates the predicate against a full value vector in parameter
    /// declaration order.
    pub(crate) fn holds(&self, values: &[usize]) -> bool {
        let selected: Vec<usize> = self.indices.iter().map(|&i| values[i]).collect();
        (self.predicate)(&selected)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("names", &self.names)
            .finish()
    }
}

/// Like a constraint, but returns a predicted local-memory byte count; a
/// configuration is admitted only when the count fits the device.
#[derive(Clone)]
pub struct LocalMemoryModel {
    pub(crate) model: LocalMemoryFn,
    pub(crate) names: Vec<String>,
    pub(crate) indices: Vec<usize>,
}

impl LocalMemoryModel {
    pub(crate) fn new(model: LocalMemoryFn, names: Vec<String>, indices: Vec<usize>) -> Self {
        Self {
            model,
            names,
            indices,
        }
    }

    pub(crate) fn bytes(&self, values: &[usize]) -> u64 {
        let selected: Vec<usize> = self.indices.iter().map(|&i| values[i]).collect();
        (self.model)(&selected)
    }
}

impl std::fmt::Debug for LocalMemoryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMemoryModel")
            .field("names", &self.names)
            .finish()
    }
}
