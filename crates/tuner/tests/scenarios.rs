//! End-to-end tuning runs against the host simulator device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tunesmith_device::{DeviceError, HostDevice, HostKernel};
use tunesmith_tuner::{TuneError, Tuner};

/// out[i] = 2 * in[i] + EPS * 1e-6, with EPS read from the define prelude.
fn double_kernel() -> HostKernel {
    HostKernel::new(|ctx| {
        let eps = ctx.define_or("EPS", 0) as f32 * 1e-6;
        let input = ctx.input::<f32>(0)?;
        let mut output = ctx.output::<f32>(1)?;
        for (out, v) in output.iter_mut().zip(input.iter()) {
            *out = 2.0 * v + eps;
        }
        Ok(())
    })
}

fn device_with_double_kernels() -> HostDevice {
    let mut device = HostDevice::new();
    device.register_kernel("double", double_kernel());
    device.register_kernel("double_reference", double_kernel());
    device
}

#[test]
fn scenario_single_parameter_full_search() {
    let mut device = HostDevice::new();
    device.register_kernel(
        "double",
        double_kernel().with_cost_model(|defines| defines["V"] as f64),
    );
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("kernel source", "double", &[8], &[1])
        .unwrap();
    tuner.add_parameter(id, "V", &[1, 2, 3]).unwrap();
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.use_full_search();
    tuner.tune().unwrap();

    let visited: Vec<usize> = tuner
        .results()
        .iter()
        .map(|r| r.configuration[0].value)
        .collect();
    assert_eq!(visited, vec![1, 2, 3]);
    assert_eq!(tuner.best().unwrap().time_ms, 1.0);
}

#[test]
fn scenario_equal_constraint_full_and_random() {
    let run = |random: bool| {
        let mut device = HostDevice::new();
        device.register_kernel("double", double_kernel());
        let mut tuner = Tuner::new(Box::new(device));
        let id = tuner
            .add_kernel_from_string("", "double", &[8], &[1])
            .unwrap();
        tuner.add_parameter(id, "X", &[8, 16]).unwrap();
        tuner.add_parameter(id, "Y", &[8, 16]).unwrap();
        tuner
            .add_constraint(id, |v| v[0] == v[1], &["X", "Y"])
            .unwrap();
        tuner.add_argument_input(&[1.0f32; 8]).unwrap();
        tuner.add_argument_output::<f32>(8).unwrap();
        if random {
            tuner.use_random_search(1.0);
            tuner.seed_search(7);
        }
        tuner.tune().unwrap();
        tuner.results().len()
    };
    // The legal set is {(8,8), (16,16)}: two full-search results and exactly
    // two random evaluations (possibly repeated indices).
    assert_eq!(run(false), 2);
    assert_eq!(run(true), 2);
}

#[test]
fn scenario_verification_tolerance() {
    let mut device = device_with_double_kernels();
    device.register_kernel("double_eps", double_kernel());
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "double_eps", &[8], &[1])
        .unwrap();
    // EPS is in micro-units: 10 -> 1e-5 per element (sum 8e-5, inside the
    // 1e-4 tolerance), 1000 -> 1e-3 per element (sum 8e-3, outside).
    tuner.add_parameter(id, "EPS", &[10, 1000]).unwrap();
    tuner
        .set_reference_from_string("", "double_reference", &[8], &[1])
        .unwrap();
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.tune().unwrap();

    let results = tuner.results();
    assert_eq!(results.len(), 2);
    assert!(results[0].verified);
    assert!(!results[1].verified);
    assert!(results[1].time_ms.is_finite());
    assert_eq!(tuner.best().unwrap().configuration[0].value, 10);
}

#[test]
fn reported_time_is_minimum_over_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_model = Arc::clone(&calls);
    let mut device = HostDevice::new();
    device.register_kernel(
        "double",
        double_kernel().with_cost_model(move |_| {
            let times = [5.0, 3.0, 4.0, 6.0];
            times[calls_in_model.fetch_add(1, Ordering::SeqCst) % times.len()]
        }),
    );
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "double", &[4], &[1])
        .unwrap();
    tuner.add_parameter(id, "V", &[1]).unwrap();
    tuner.add_argument_input(&[1.0f32; 4]).unwrap();
    tuner.add_argument_output::<f32>(4).unwrap();
    tuner.tune().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(tuner.results()[0].time_ms, 3.0);
}

#[test]
fn outputs_are_zeroed_before_every_configuration() {
    // The kernel accumulates into its output; without the per-configuration
    // reset the second configuration would observe the first one's results.
    let accumulate = || {
        HostKernel::new(|ctx| {
            let mut output = ctx.output::<f32>(0)?;
            for out in output.iter_mut() {
                *out += 1.0;
            }
            Ok(())
        })
    };
    let mut device = HostDevice::new();
    device.register_kernel("accumulate", accumulate());
    device.register_kernel("accumulate_reference", accumulate());
    let mut tuner = Tuner::new(Box::new(device));
    tuner.set_num_runs(1);
    let id = tuner
        .add_kernel_from_string("", "accumulate", &[4], &[1])
        .unwrap();
    tuner.add_parameter(id, "V", &[1, 2]).unwrap();
    tuner
        .set_reference_from_string("", "accumulate_reference", &[4], &[1])
        .unwrap();
    tuner.add_argument_output::<f32>(4).unwrap();
    tuner.tune().unwrap();

    for result in tuner.results() {
        assert!(result.verified, "output was not reset before evaluation");
    }
}

#[test]
fn reference_snapshot_is_taken_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in_kernel = Arc::clone(&runs);
    let mut device = HostDevice::new();
    device.register_kernel("double", double_kernel());
    device.register_kernel(
        "counting_reference",
        HostKernel::new(move |ctx| {
            runs_in_kernel.fetch_add(1, Ordering::SeqCst);
            let input = ctx.input::<f32>(0)?;
            let mut output = ctx.output::<f32>(1)?;
            for (out, v) in output.iter_mut().zip(input.iter()) {
                *out = 2.0 * v;
            }
            Ok(())
        }),
    );
    let mut tuner = Tuner::new(Box::new(device));
    tuner.set_num_runs(1);
    for _ in 0..2 {
        let id = tuner
            .add_kernel_from_string("", "double", &[8], &[1])
            .unwrap();
        tuner.add_parameter(id, "V", &[1, 2]).unwrap();
    }
    tuner
        .set_reference_from_string("", "counting_reference", &[8], &[1])
        .unwrap();
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.tune().unwrap();

    // Two tunable kernels, four configurations total, one reference run.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(tuner.results().len(), 4);
}

#[test]
fn launch_failures_are_contained() {
    let mut device = HostDevice::new();
    device.register_kernel(
        "sometimes_fails",
        HostKernel::new(|ctx| {
            if ctx.define_or("MODE", 0) == 2 {
                return Err(DeviceError::Launch("illegal access".into()));
            }
            let mut output = ctx.output::<f32>(0)?;
            output.fill(1.0);
            Ok(())
        }),
    );
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "sometimes_fails", &[4], &[1])
        .unwrap();
    tuner.add_parameter(id, "MODE", &[1, 2, 3]).unwrap();
    tuner.add_argument_output::<f32>(4).unwrap();
    tuner.tune().unwrap();

    let results = tuner.results();
    assert_eq!(results.len(), 3);
    assert!(results[0].time_ms.is_finite());
    assert!(results[1].failed());
    assert!(results[2].time_ms.is_finite());
    assert_eq!(tuner.best().unwrap().configuration[0].value, 1);
}

#[test]
fn compile_failures_leave_no_valid_result() {
    let mut device = HostDevice::new();
    device.register_kernel("double", double_kernel());
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("#error always broken\n", "double", &[4], &[1])
        .unwrap();
    tuner.add_parameter(id, "V", &[1, 2]).unwrap();
    tuner.add_argument_input(&[1.0f32; 4]).unwrap();
    tuner.add_argument_output::<f32>(4).unwrap();
    tuner.tune().unwrap();

    assert_eq!(tuner.results().len(), 2);
    assert!(tuner.results().iter().all(|r| r.failed()));
    assert!(tuner.best().is_none());
    assert_eq!(tuner.print_to_screen(), 0.0);
}

#[test]
fn empty_legal_set_is_fatal() {
    let mut device = HostDevice::new();
    device.register_kernel("double", double_kernel());
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "double", &[4], &[1])
        .unwrap();
    tuner.add_parameter(id, "V", &[1, 2]).unwrap();
    tuner.add_constraint(id, |_| false, &["V"]).unwrap();
    assert!(matches!(tuner.tune(), Err(TuneError::EmptySpace(_))));
}

#[test]
fn annealing_respects_budget_and_writes_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("search_log.txt");

    let mut device = HostDevice::new();
    device.register_kernel(
        "double",
        double_kernel().with_cost_model(|defines| (defines["A"] * 10 + defines["B"]) as f64),
    );
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "double", &[8], &[1])
        .unwrap();
    let values: Vec<usize> = (1..=10).collect();
    tuner.add_parameter(id, "A", &values).unwrap();
    tuner.add_parameter(id, "B", &values).unwrap();
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.use_annealing(0.25, 2.0);
    tuner.seed_search(13);
    tuner.output_search_log(&log_path);
    tuner.tune().unwrap();

    // 100 configurations at fraction 0.25: 25 evaluations.
    assert_eq!(tuner.results().len(), 25);
    let log = std::fs::read_to_string(&log_path).unwrap();
    let mut lines = log.lines();
    assert_eq!(lines.next().unwrap(), "step;index;time");
    assert_eq!(lines.count(), 25);
}

#[test]
fn pso_budget_over_four_parameters() {
    let mut device = HostDevice::new();
    device.register_kernel("double", double_kernel());
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "double", &[8], &[1])
        .unwrap();
    for name in ["A", "B", "C", "D"] {
        tuner.add_parameter(id, name, &[1, 2, 4]).unwrap();
    }
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.use_pso(0.5, 4, 0.5, 0.5, 0.5);
    tuner.seed_search(99);
    tuner.tune().unwrap();

    // 81 configurations at fraction 0.5: exactly 40 evaluations.
    assert_eq!(tuner.results().len(), 40);
}

#[test]
fn parameterless_kernel_runs_once() {
    let device = device_with_double_kernels();
    let mut tuner = Tuner::new(Box::new(device));
    tuner
        .add_kernel_from_string("", "double", &[8], &[1])
        .unwrap();
    tuner
        .set_reference_from_string("", "double_reference", &[8], &[1])
        .unwrap();
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.tune().unwrap();

    assert_eq!(tuner.results().len(), 1);
    assert!(tuner.results()[0].verified);
    assert!(tuner.results()[0].configuration.is_empty());
}

#[test]
fn reports_are_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = HostDevice::new();
    device.register_kernel(
        "double",
        double_kernel().with_cost_model(|defines| defines["V"] as f64),
    );
    let mut tuner = Tuner::new(Box::new(device));
    let id = tuner
        .add_kernel_from_string("", "double", &[8], &[1])
        .unwrap();
    tuner.add_parameter(id, "V", &[1, 2]).unwrap();
    tuner.add_argument_input(&[1.0f32; 8]).unwrap();
    tuner.add_argument_output::<f32>(8).unwrap();
    tuner.tune().unwrap();

    let csv = dir.path().join("results.csv");
    let json = dir.path().join("results.json");
    tuner.print_to_file(&csv).unwrap();
    tuner.print_json(&json, &[("sample", "test")]).unwrap();

    let csv_text = std::fs::read_to_string(&csv).unwrap();
    assert!(csv_text.starts_with("name;time;threads;V;"));
    let json_value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(json_value.as_array().unwrap().len(), 2);
    assert_eq!(json_value[0]["extra"]["sample"], "test");
}
