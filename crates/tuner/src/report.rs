//! Result reporting: screen, CSV file, and JSON with user-supplied tags.

use crate::result::{best_outcome, TuningOutcome};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Prints all verified results and the best entry; returns the best time in
/// milliseconds, or 0.0 when no configuration completed.
pub fn print_to_screen(results: &[TuningOutcome]) -> f64 {
    let Some(best) = best_outcome(results) else {
        println!("[   BEST ] no valid configuration found");
        return 0.0;
    };
    for result in results.iter().filter(|r| r.verified && !r.failed()) {
        println!(
            "[ RESULT ] {}; {:8.2} ms; {}",
            result.kernel,
            result.time_ms,
            result.settings_line()
        );
    }
    let marker = if best.verified { "" } else { " (unverified)" };
    println!(
        "[   BEST ] {}; {:8.2} ms; {}{}",
        best.kernel,
        best.time_ms,
        best.settings_line(),
        marker
    );
    best.time_ms
}

/// Writes the verified results as semicolon-separated values, with one
/// header row per kernel name encountered.
pub fn write_csv(results: &[TuningOutcome], path: &Path) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    let mut seen_kernels: Vec<&str> = Vec::new();
    for result in results.iter().filter(|r| r.verified && !r.failed()) {
        if !seen_kernels.contains(&result.kernel.as_str()) {
            seen_kernels.push(&result.kernel);
            write!(file, "name;time;threads;")?;
            for setting in &result.configuration {
                write!(file, "{};", setting.name)?;
            }
            writeln!(file)?;
        }
        write!(
            file,
            "{};{:.2};{};",
            result.kernel, result.time_ms, result.local_threads
        )?;
        for setting in &result.configuration {
            write!(file, "{};", setting.value)?;
        }
        writeln!(file)?;
    }
    file.flush()
}

/// Writes all completed results as a JSON array of
/// `{kernel, time, params, extra}` objects.
pub fn write_json(
    results: &[TuningOutcome],
    path: &Path,
    extra: &[(&str, &str)],
) -> io::Result<()> {
    let extra_map: Map<String, Value> = extra
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();

    let entries: Vec<Value> = results
        .iter()
        .filter(|r| !r.failed())
        .map(|result| {
            let params: Map<String, Value> = result
                .configuration
                .iter()
                .map(|setting| (setting.name.clone(), json!(setting.value)))
                .collect();
            json!({
                "kernel": result.kernel,
                "time": result.time_ms,
                "verified": result.verified,
                "params": params,
                "extra": extra_map,
            })
        })
        .collect();

    let mut file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut file, &Value::Array(entries))?;
    writeln!(file)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesmith_space::Setting;

    fn outcome(time_ms: f64, verified: bool) -> TuningOutcome {
        TuningOutcome {
            kernel: "gemm".into(),
            time_ms,
            local_threads: 64,
            verified,
            configuration: vec![Setting::new("TILE", 32), Setting::new("UNROLL", 4)],
        }
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        write_csv(&[outcome(1.5, true), outcome(2.5, true)], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "name;time;threads;TILE;UNROLL;");
        assert_eq!(lines.next().unwrap(), "gemm;1.50;64;32;4;");
        assert_eq!(lines.next().unwrap(), "gemm;2.50;64;32;4;");
    }

    #[test]
    fn json_carries_params_and_extra_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_json(&[outcome(1.5, true)], &path, &[("sample", "gemm")]).unwrap();
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &value.as_array().unwrap()[0];
        assert_eq!(entry["kernel"], "gemm");
        assert_eq!(entry["params"]["TILE"], 32);
        assert_eq!(entry["extra"]["sample"], "gemm");
    }

    #[test]
    fn failed_runs_are_excluded_from_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_json(&[outcome(f64::INFINITY, false)], &path, &[]).unwrap();
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.as_array().unwrap().is_empty());
    }
}
