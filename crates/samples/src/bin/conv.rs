//! Tunes a 2D convolution with a gaussian blur filter, including the
//! halo-thread helper parameters and their coupling constraints.

use anyhow::Result;
use clap::Parser;
use rayon::prelude::*;
use tunesmith_device::{Defines, DeviceError, HostDevice, HostKernel, LaunchContext};
use tunesmith_samples::{init_logging, random_data, select_search_method, Cli};
use tunesmith_tuner::Tuner;

// Half filter size and filter size; synchronise with the kernel bodies.
const HFS: usize = 3;
const FS: usize = 2 * HFS + 1;

const SIZE_X: usize = 512;
const SIZE_Y: usize = 256;
const EXTRA: usize = FS * 8;

fn ceil_div(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

fn is_multiple(a: usize, b: usize) -> bool {
    (a / b) * b == a
}

/// out[y*X + x] = sum over the FS x FS window of coeff * padded input.
fn convolution(ctx: &LaunchContext<'_>) -> Result<(), DeviceError> {
    let size_x = ctx.int(0)? as usize;
    let _size_y = ctx.int(1)?;
    let src_view = ctx.input::<f32>(2)?;
    let coeff_view = ctx.input::<f32>(3)?;
    let mut dst_view = ctx.output::<f32>(4)?;
    let (src, coeff, dst): (&[f32], &[f32], &mut [f32]) =
        (&src_view, &coeff_view, &mut dst_view);

    let src_width = size_x + EXTRA;
    dst.par_chunks_mut(size_x).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for fy in 0..FS {
                for fx in 0..FS {
                    acc += coeff[fy * FS + fx] * src[(y + fy) * src_width + x + fx];
                }
            }
            *out = acc;
        }
    });
    Ok(())
}

/// Synthetic cost: per-thread work against tile shape, with local-memory
/// caching and vector-load bonuses.
fn conv_cost(defines: &Defines) -> f64 {
    let get = |name: &str| defines[name] as f64;
    let tile = get("TBX") * get("WPTX") * get("TBY") * get("WPTY");
    let reuse = match defines["LOCAL"] {
        0 => 1.0,
        1 => 0.8,
        _ => 0.74,
    };
    let vector = get("VECTOR").sqrt();
    let unroll = 1.0 + 0.05 * get("UNROLL_FACTOR").log2();
    let occupancy = 900.0 / (get("TBX_XL") * get("TBY_XL"));
    2.0e-4 * tile * reuse / (vector * unroll) + occupancy
}

fn gaussian_coefficients() -> Vec<f32> {
    let sigma = 1.0f32;
    let mean = FS as f32 / 2.0;
    let mut coeff = vec![0.0f32; FS * FS];
    let mut sum = 0.0f32;
    for x in 0..FS {
        for y in 0..FS {
            let dx = (x as f32 - mean) / sigma;
            let dy = (y as f32 - mean) / sigma;
            let value = (-0.5 * (dx * dx + dy * dy)).exp()
                / (2.0 * std::f32::consts::PI * sigma * sigma);
            coeff[y * FS + x] = value;
            sum += value;
        }
    }
    for item in &mut coeff {
        *item /= sum;
    }
    coeff
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    fastrand::seed(2024);
    let mat_a = random_data((SIZE_X + EXTRA) * (SIZE_Y + EXTRA));
    let coeff = gaussian_coefficients();

    let mut device = HostDevice::new();
    device.register_kernel("conv_reference", HostKernel::new(convolution));
    device.register_kernel(
        "conv",
        HostKernel::new(convolution)
            .with_cost_model(conv_cost)
            .with_local_memory(|defines| {
                let v = |name: &str| defines[name] as u64;
                if v("LOCAL") != 0 {
                    let hfs = HFS as u64;
                    (v("TBX") * v("WPTX") + 2 * hfs)
                        * (v("TBY") * v("WPTY") + 2 * hfs + v("PADDING"))
                        * 4
                } else {
                    0
                }
            }),
    );

    let mut tuner = Tuner::new(Box::new(device));
    select_search_method(&mut tuner, &cli, 1.0 / 128.0);
    tuner.output_search_log("search_log.txt");

    let id = tuner.add_kernel_from_string("", "conv", &[SIZE_X, SIZE_Y], &[1, 1])?;
    tuner.add_parameter(id, "TBX", &[8, 16, 32, 64])?;
    tuner.add_parameter(id, "TBY", &[8, 16, 32, 64])?;
    tuner.add_parameter(id, "LOCAL", &[0, 1, 2])?;
    tuner.add_parameter(id, "WPTX", &[1, 2, 4, 8])?;
    tuner.add_parameter(id, "WPTY", &[1, 2, 4, 8])?;
    tuner.add_parameter(id, "VECTOR", &[1, 2, 4])?;
    tuner.add_parameter(id, "UNROLL_FACTOR", &[1, FS])?;
    tuner.add_parameter(id, "PADDING", &[0, 1])?;

    // Workgroup sizes plus the extra halo threads for the LOCAL == 2 case.
    let halo_sizes: Vec<usize> = (8..=15)
        .chain(16..=26)
        .chain(32..=42)
        .chain(64..=74)
        .collect();
    tuner.add_parameter(id, "TBX_XL", &halo_sizes)?;
    tuner.add_parameter(id, "TBY_XL", &halo_sizes)?;

    let halo_threads = |v: &[usize]| {
        if v[0] == 2 {
            v[1] == v[2] + ceil_div(2 * HFS, v[3])
        } else {
            v[1] == v[2]
        }
    };
    tuner.add_constraint(id, halo_threads, &["LOCAL", "TBX_XL", "TBX", "WPTX"])?;
    tuner.add_constraint(id, halo_threads, &["LOCAL", "TBY_XL", "TBY", "WPTY"])?;

    // Vector loads must divide the per-thread work (and the halo, when the
    // halo is loaded vectorized).
    tuner.add_constraint(
        id,
        |v| {
            if v[0] == 2 {
                is_multiple(v[2], v[1]) && is_multiple(2 * HFS, v[1])
            } else {
                is_multiple(v[2], v[1])
            }
        },
        &["LOCAL", "VECTOR", "WPTX"],
    )?;

    // Padding only applies when local memory is in use.
    tuner.add_constraint(id, |v| v[1] == 0 || v[0] != 0, &["LOCAL", "PADDING"])?;

    tuner.set_local_memory_usage(
        id,
        |v| {
            if v[0] != 0 {
                (((v[3] * v[4] + 2 * HFS) * (v[1] * v[2] + 2 * HFS + v[5])) * 4) as u64
            } else {
                0
            }
        },
        &["LOCAL", "TBX", "WPTX", "TBY", "WPTY", "PADDING"],
    )?;

    tuner.mul_local_size(id, &["TBX_XL", "TBY_XL"])?;
    tuner.mul_global_size(id, &["TBX_XL", "TBY_XL"])?;
    tuner.div_global_size(id, &["TBX", "TBY"])?;
    tuner.div_global_size(id, &["WPTX", "WPTY"])?;

    tuner.set_reference_from_string("", "conv_reference", &[SIZE_X, SIZE_Y], &[8, 8])?;

    tuner.add_argument_scalar(SIZE_X as i32);
    tuner.add_argument_scalar(SIZE_Y as i32);
    tuner.add_argument_input(&mat_a)?;
    tuner.add_argument_input(&coeff)?;
    tuner.add_argument_output::<f32>(SIZE_X * SIZE_Y)?;

    tuner.tune()?;
    let time_ms = tuner.print_to_screen();
    tuner.print_to_file("output.csv")?;
    tuner.print_json("output.json", &[("sample", "convolution")])?;

    let megabytes = (4 * 2 * SIZE_X * SIZE_Y) as f64 * 1.0e-6;
    if time_ms != 0.0 {
        println!("[ -------> ] {time_ms:.1} ms or {:.1} GB/s", megabytes / time_ms);
    }
    Ok(())
}
