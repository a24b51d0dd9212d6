//! Tunes a heavily parameterized SGEMM kernel (C = A * B^T with B stored
//! pre-transposed), the large constrained search space of the sample set.

use anyhow::Result;
use clap::Parser;
use ndarray::Array2;
use tunesmith_device::{Defines, DeviceError, HostDevice, HostKernel, LaunchContext};
use tunesmith_samples::{init_logging, random_data, select_search_method, Cli};
use tunesmith_tuner::Tuner;

const SIZE_M: usize = 256;
const SIZE_N: usize = 256;
const SIZE_K: usize = 256;

fn is_multiple(a: usize, b: usize) -> bool {
    (a / b) * b == a
}

/// C = A * B^T via ndarray; both kernel variants compute the same product,
/// the tuning landscape lives in the cost model.
fn gemm(ctx: &LaunchContext<'_>) -> Result<(), DeviceError> {
    let m = ctx.int(0)? as usize;
    let n = ctx.int(1)? as usize;
    let k = ctx.int(2)? as usize;
    let a = ctx.input::<f32>(3)?;
    let b = ctx.input::<f32>(4)?;
    let mut c = ctx.output::<f32>(5)?;

    let a = Array2::from_shape_vec((m, k), a.to_vec())
        .map_err(|e| DeviceError::Launch(e.to_string()))?;
    let b = Array2::from_shape_vec((n, k), b.to_vec())
        .map_err(|e| DeviceError::Launch(e.to_string()))?;
    let product = a.dot(&b.t());
    for (out, value) in c.iter_mut().zip(product.iter()) {
        *out = *value;
    }
    Ok(())
}

/// Synthetic per-configuration cost: work per thread, scaled by
/// vector-width and local-memory-caching bonuses.
fn gemm_cost(defines: &Defines) -> f64 {
    let get = |name: &str| defines[name] as f64;
    let threads = get("MDIMC") * get("NDIMC");
    let work_per_thread = get("MWG") * get("NWG") * get("KWG") / threads;
    let vector = (get("VWM") * get("VWN")).sqrt();
    let mut cache = 1.0;
    if get("SA") == 1.0 {
        cache *= 0.72;
    }
    if get("SB") == 1.0 {
        cache *= 0.78;
    }
    let unroll = 1.0 + 0.1 * get("KWI").log2();
    0.02 * work_per_thread * cache / (vector * unroll) + 300.0 / threads
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    fastrand::seed(2024);
    let mat_a = random_data(SIZE_M * SIZE_K);
    let mat_b = random_data(SIZE_N * SIZE_K);

    let mut device = HostDevice::new();
    device.register_kernel("gemm_reference", HostKernel::new(gemm));
    device.register_kernel(
        "gemm_fast",
        HostKernel::new(gemm)
            .with_cost_model(gemm_cost)
            .with_local_memory(|defines| {
                let v = |name: &str| defines[name] as u64;
                ((v("SA") * v("KWG") * v("MWG") / v("VWM"))
                    + (v("SB") * v("KWG") * v("NWG") / v("VWN")))
                    * 4
            }),
    );

    let mut tuner = Tuner::new(Box::new(device));
    select_search_method(&mut tuner, &cli, 1.0 / 64.0);
    tuner.output_search_log("search_log.txt");

    let id = tuner.add_kernel_from_string("", "gemm_fast", &[SIZE_M, SIZE_N], &[1, 1])?;
    tuner.add_parameter(id, "MWG", &[16, 32, 64, 128])?;
    tuner.add_parameter(id, "NWG", &[16, 32, 64, 128])?;
    tuner.add_parameter(id, "KWG", &[16, 32])?;
    tuner.add_parameter(id, "MDIMC", &[8, 16, 32])?;
    tuner.add_parameter(id, "NDIMC", &[8, 16, 32])?;
    tuner.add_parameter(id, "MDIMA", &[8, 16, 32])?;
    tuner.add_parameter(id, "NDIMB", &[8, 16, 32])?;
    tuner.add_parameter(id, "KWI", &[2, 8])?;
    tuner.add_parameter(id, "VWM", &[1, 2, 4, 8])?;
    tuner.add_parameter(id, "VWN", &[1, 2, 4, 8])?;
    tuner.add_parameter(id, "STRM", &[0, 1])?;
    tuner.add_parameter(id, "STRN", &[0, 1])?;
    tuner.add_parameter(id, "SA", &[0, 1])?;
    tuner.add_parameter(id, "SB", &[0, 1])?;
    tuner.add_parameter(id, "PRECISION", &[32])?;

    // Unrolling the KWG loop requires a whole number of iterations.
    tuner.add_constraint(id, |v| is_multiple(v[0], v[1]), &["KWG", "KWI"])?;

    // Integer per-thread work sizes, for both compute and off-chip loads.
    let multiple_of_x_mul_y = |v: &[usize]| is_multiple(v[0], v[1] * v[2]);
    tuner.add_constraint(id, multiple_of_x_mul_y, &["MWG", "MDIMC", "VWM"])?;
    tuner.add_constraint(id, multiple_of_x_mul_y, &["NWG", "NDIMC", "VWN"])?;
    tuner.add_constraint(id, multiple_of_x_mul_y, &["MWG", "MDIMA", "VWM"])?;
    tuner.add_constraint(id, multiple_of_x_mul_y, &["NWG", "NDIMB", "VWN"])?;

    // KWG must span whole rows of the rearranged workgroup tiles.
    let multiple_of_x_mul_y_div_z = |v: &[usize]| is_multiple(v[0], v[1] * v[2] / v[3]);
    tuner.add_constraint(id, multiple_of_x_mul_y_div_z, &["KWG", "MDIMC", "NDIMC", "MDIMA"])?;
    tuner.add_constraint(id, multiple_of_x_mul_y_div_z, &["KWG", "MDIMC", "NDIMC", "NDIMB"])?;

    tuner.set_local_memory_usage(
        id,
        |v| (((v[0] * v[1] * v[2] / v[3]) + (v[4] * v[5] * v[6] / v[7])) * 4) as u64,
        &["SA", "KWG", "MWG", "VWM", "SB", "KWG", "NWG", "VWN"],
    )?;

    tuner.mul_local_size(id, &["MDIMC", "NDIMC"])?;
    tuner.mul_global_size(id, &["MDIMC", "NDIMC"])?;
    tuner.div_global_size(id, &["MWG", "NWG"])?;

    tuner.set_reference_from_string("", "gemm_reference", &[SIZE_M, SIZE_N], &[8, 8])?;

    tuner.add_argument_scalar(SIZE_M as i32);
    tuner.add_argument_scalar(SIZE_N as i32);
    tuner.add_argument_scalar(SIZE_K as i32);
    tuner.add_argument_input(&mat_a)?;
    tuner.add_argument_input(&mat_b)?;
    tuner.add_argument_output::<f32>(SIZE_M * SIZE_N)?;

    tuner.tune()?;
    let time_ms = tuner.print_to_screen();
    tuner.print_to_file("output.csv")?;
    tuner.print_json("output.json", &[("sample", "gemm")])?;

    let mega_flop = (2 * SIZE_M * SIZE_N * SIZE_K) as f64 * 1.0e-6;
    if time_ms != 0.0 {
        println!("[ -------> ] {time_ms:.1} ms or {:.3} GFLOPS", mega_flop / time_ms);
    }
    Ok(())
}
