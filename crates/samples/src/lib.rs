//! Shared wiring for the sample binaries: CLI parsing, logging, and the
//! search-method selection convention.

use clap::Parser;
use tunesmith_tuner::Tuner;

/// Positional arguments shared by all samples.
#[derive(Parser, Debug)]
#[command(about = "tunesmith sample", disable_help_subcommand = true)]
pub struct Cli {
    /// Device ordinal (meaningful for the CUDA backend; the host simulator
    /// ignores it).
    #[arg(default_value_t = 0)]
    pub device_id: usize,

    /// Search method: 0 random, 1 annealing, 2 PSO, 3 full search.
    #[arg(default_value_t = 1)]
    pub search_method: usize,

    /// Annealing temperature or PSO swarm size, depending on the method.
    #[arg(default_value_t = 4)]
    pub search_param_1: usize,
}

pub fn init_logging() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Applies the conventional method encoding to the tuner.
pub fn select_search_method(tuner: &mut Tuner, cli: &Cli, fraction: f64) {
    match cli.search_method {
        0 => tuner.use_random_search(fraction),
        1 => tuner.use_annealing(fraction, cli.search_param_1 as f64),
        2 => tuner.use_pso(fraction, cli.search_param_1, 0.4, 0.0, 0.4),
        _ => tuner.use_full_search(),
    }
}

/// Uniform random data in [-2, 2), matching the sample kernels' inputs.
pub fn random_data(len: usize) -> Vec<f32> {
    (0..len).map(|_| fastrand::f32() * 4.0 - 2.0).collect()
}
