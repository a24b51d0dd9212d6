//! Tuning results and the best-configuration query.

use serde::Serialize;
use tunesmith_space::Configuration;

/// The outcome of evaluating one configuration. Infinite `time_ms` marks a
/// failed run; `verified == false` marks a numerical mismatch (or a failure).
#[derive(Debug, Clone, Serialize)]
pub struct TuningOutcome {
    pub kernel: String,
    pub time_ms: f64,
    pub local_threads: usize,
    pub verified: bool,
    pub configuration: Configuration,
}

impl TuningOutcome {
    pub fn failed(&self) -> bool {
        self.time_ms.is_infinite()
    }

    pub(crate) fn settings_line(&self) -> String {
        self.configuration
            .iter()
            .map(|setting| setting.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The minimum-time verified outcome; if no verified outcome exists, the
/// minimum-time unverified one. A failed entry is never returned.
pub fn best_outcome(results: &[TuningOutcome]) -> Option<&TuningOutcome> {
    let fastest = |verified: bool| {
        results
            .iter()
            .filter(|r| r.verified == verified && !r.failed())
            .min_by(|a, b| a.time_ms.total_cmp(&b.time_ms))
    };
    fastest(true).or_else(|| fastest(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(time_ms: f64, verified: bool) -> TuningOutcome {
        TuningOutcome {
            kernel: "k".into(),
            time_ms,
            local_threads: 1,
            verified,
            configuration: Vec::new(),
        }
    }

    #[test]
    fn verified_results_win_over_faster_unverified() {
        let results = vec![outcome(1.0, false), outcome(5.0, true), outcome(3.0, true)];
        let best = best_outcome(&results).unwrap();
        assert_eq!(best.time_ms, 3.0);
        assert!(best.verified);
    }

    #[test]
    fn unverified_fallback_when_nothing_verified() {
        let results = vec![outcome(4.0, false), outcome(2.0, false)];
        let best = best_outcome(&results).unwrap();
        assert_eq!(best.time_ms, 2.0);
    }

    #[test]
    fn failed_entries_are_never_best() {
        let results = vec![outcome(f64::INFINITY, true), outcome(f64::INFINITY, false)];
        assert!(best_outcome(&results).is_none());
    }
}
