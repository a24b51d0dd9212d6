//! Configuration space engine: tuning parameters, constraints, thread-range
//! modifiers, and the enumeration of legal kernel configurations.

mod constraint;
mod kernel;
mod parameter;
mod range;

pub use constraint::{Constraint, ConstraintFn, LocalMemoryFn, LocalMemoryModel};
pub use kernel::{ConfigurationSpace, KernelSpec};
pub use parameter::{define_prelude, Configuration, Parameter, Setting};
pub use range::{DeviceLimits, ModifierKind, NdRange, RangeModifier, RangeTarget};

use thiserror::Error;

/// Errors raised while declaring or enumerating a parameter space.
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("parameter '{0}' is already declared for this kernel")]
    DuplicateParameter(String),

    #[error("parameter '{0}' is not declared for this kernel")]
    UnknownParameter(String),

    #[error("parameter '{0}' has no candidate values")]
    EmptyValueList(String),

    #[error("thread ranges must have 1 to 3 dimensions, got {0}")]
    BadDimensionCount(usize),

    #[error("range modifier names {names} parameters but the {target:?} range has {dims} dimensions")]
    ModifierOutOfRange {
        names: usize,
        target: RangeTarget,
        dims: usize,
    },

    #[error("division of the {target:?} range by zero (parameter '{name}')")]
    DivisionByZero { target: RangeTarget, name: String },

    #[error("local range is zero in dimension {0} after applying modifiers")]
    ZeroLocalSize(usize),

    #[error("global size {global} is not a multiple of local size {local} in dimension {dim}")]
    IndivisibleRange {
        dim: usize,
        global: usize,
        local: usize,
    },

    #[error("local work size {requested} exceeds the device limit {limit}")]
    WorkGroupTooLarge { requested: usize, limit: usize },

    #[error("local size {requested} in dimension {dim} exceeds the device limit {limit}")]
    WorkItemTooLarge {
        dim: usize,
        requested: usize,
        limit: usize,
    },

    #[error("range uses {requested} dimensions but the device supports {limit}")]
    TooManyDimensions { requested: usize, limit: usize },
}
