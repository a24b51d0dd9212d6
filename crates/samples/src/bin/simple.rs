//! Tunes a matrix-vector multiplication, the introductory sample: one kernel
//! with manual unrolling and one that tiles the input vector, against a
//! plain reference.

use anyhow::Result;
use clap::Parser;
use rayon::prelude::*;
use tunesmith_device::{DeviceError, HostDevice, HostKernel, LaunchContext};
use tunesmith_samples::{init_logging, random_data, select_search_method, Cli};
use tunesmith_tuner::Tuner;

const SIZE_M: usize = 512;
const SIZE_N: usize = 1024;

/// y[i] = sum_j a[j*M + i] * x[j], with matrix A stored transposed.
fn matvec(ctx: &LaunchContext<'_>) -> Result<(), DeviceError> {
    let m = ctx.int(0)? as usize;
    let n = ctx.int(1)? as usize;
    let a_view = ctx.input::<f32>(2)?;
    let x_view = ctx.input::<f32>(3)?;
    let mut y_view = ctx.output::<f32>(4)?;
    let (a, x, y): (&[f32], &[f32], &mut [f32]) = (&a_view, &x_view, &mut y_view);
    y.par_iter_mut().enumerate().for_each(|(i, out)| {
        let mut acc = 0.0f32;
        for j in 0..n {
            acc += a[j * m + i] * x[j];
        }
        *out = acc;
    });
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    fastrand::seed(2024);
    let mat_a = random_data(SIZE_N * SIZE_M);
    let vec_x = random_data(SIZE_N);

    let mut device = HostDevice::new();
    device.register_kernel("matvec_reference", HostKernel::new(matvec));
    // Unrolling pays off with diminishing returns.
    device.register_kernel(
        "matvec_unroll",
        HostKernel::new(matvec).with_cost_model(|defines| {
            let unroll = defines["UNROLL"] as f64;
            60.0 / (1.0 + 0.4 * unroll.log2())
        }),
    );
    // Tiling has a sweet spot around 128 and pays for local memory.
    device.register_kernel(
        "matvec_tiled",
        HostKernel::new(matvec)
            .with_cost_model(|defines| {
                let ts = defines["TS"] as f64;
                32.0 + 6.0 * (ts.log2() - 7.0).powi(2)
            })
            .with_local_memory(|defines| (defines["TS"] * 4) as u64),
    );

    let mut tuner = Tuner::new(Box::new(device));
    select_search_method(&mut tuner, &cli, 1.0);

    let id = tuner.add_kernel_from_string("", "matvec_unroll", &[SIZE_M], &[128])?;
    tuner.add_parameter(id, "UNROLL", &[1, 2, 4])?;

    let id = tuner.add_kernel_from_string("", "matvec_tiled", &[SIZE_M], &[1])?;
    tuner.add_parameter(id, "TS", &[32, 64, 128, 256, 512])?;
    tuner.mul_local_size(id, &["TS"])?;

    tuner.set_reference_from_string("", "matvec_reference", &[SIZE_M], &[128])?;

    tuner.add_argument_scalar(SIZE_M as i32);
    tuner.add_argument_scalar(SIZE_N as i32);
    tuner.add_argument_input(&mat_a)?;
    tuner.add_argument_input(&vec_x)?;
    tuner.add_argument_output::<f32>(SIZE_M)?;

    tuner.tune()?;
    tuner.print_to_screen();
    tuner.print_json("output.json", &[("sample", "simple")])?;
    Ok(())
}
