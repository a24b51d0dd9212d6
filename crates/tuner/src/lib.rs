//! Core of the tunesmith auto-tuner: kernel registration, the evaluation
//! pipeline, argument management, result collection, and reporting.

mod args;
mod report;
mod result;
mod tuner;
mod verify;

pub use args::ArgumentStore;
pub use result::{best_outcome, TuningOutcome};
pub use tuner::{SearchMethod, Tuner};

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tunesmith_device::DeviceError;
use tunesmith_space::SpaceError;

/// Setup-level failures. Per-configuration failures never surface here;
/// they are recorded as results with infinite time instead.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("invalid kernel id {0}")]
    InvalidKernelId(usize),

    #[error("kernel '{0}' has no legal configurations")]
    EmptySpace(String),

    #[error("could not read kernel source '{path}'")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
