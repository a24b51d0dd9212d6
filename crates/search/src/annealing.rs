//! Simulated annealing at a fixed temperature.

use crate::record::SearchRecord;
use crate::{budget, clock_seed, Searcher};
use std::io::{self, Write};
use std::sync::Arc;
use tunesmith_space::{Configuration, ConfigurationSpace};

/// Bounded number of neighbor draws before the walker stays in place for a
/// step (the drawn neighbor may have been filtered out of the legal set).
const MAX_NEIGHBOUR_DRAWS: usize = 8;

pub struct Annealing {
    record: SearchRecord,
    visits: usize,
    temperature: f64,
    rng: fastrand::Rng,
    accepted: usize,
    accepted_time: f64,
}

impl Annealing {
    pub fn new(space: Arc<ConfigurationSpace>, fraction: f64, temperature: f64) -> Self {
        Self::with_seed(space, fraction, temperature, clock_seed())
    }

    pub fn with_seed(
        space: Arc<ConfigurationSpace>,
        fraction: f64,
        temperature: f64,
        seed: u64,
    ) -> Self {
        let visits = budget(fraction, space.len());
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut record = SearchRecord::new(space);
        record.current = rng.usize(..record.space().len());
        let accepted = record.current;
        Self {
            record,
            visits,
            temperature,
            rng,
            accepted,
            accepted_time: f64::INFINITY,
        }
    }

    /// One-step neighborhood: change a single parameter to a different value
    /// from its list and look the result up in the legal set.
    fn draw_neighbour(&mut self) -> usize {
        let space = Arc::clone(self.record.space());
        let parameters = space.parameters();
        let values = space.values_at(self.accepted);

        for _ in 0..MAX_NEIGHBOUR_DRAWS {
            let p = self.rng.usize(..parameters.len());
            let candidates = &parameters[p].values;
            if candidates.len() < 2 {
                continue;
            }
            let replacement = candidates[self.rng.usize(..candidates.len())];
            if replacement == values[p] {
                continue;
            }
            let mut neighbour = values.clone();
            neighbour[p] = replacement;
            if let Some(index) = space.position_of(&neighbour) {
                return index;
            }
        }
        self.accepted
    }

    fn accepts(&mut self, candidate_time: f64) -> bool {
        if candidate_time.is_infinite() {
            return false;
        }
        if self.accepted_time.is_infinite() {
            return true;
        }
        let delta = candidate_time - self.accepted_time;
        delta <= 0.0 || self.rng.f64() < (-delta / self.temperature).exp()
    }
}

impl Searcher for Annealing {
    fn num_visits(&self) -> usize {
        self.visits
    }

    fn next(&self) -> &Configuration {
        self.record.current_configuration()
    }

    fn report(&mut self, time_ms: f64) {
        self.record.report(time_ms);
    }

    fn advance(&mut self) {
        if let Some(time) = self.record.last_time() {
            if self.accepts(time) {
                self.accepted = self.record.current;
                self.accepted_time = time;
            }
        }
        self.record.current = self.draw_neighbour();
    }

    fn write_log(&self, sink: &mut dyn Write) -> io::Result<()> {
        self.record.write_log(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesmith_space::{DeviceLimits, KernelSpec, NdRange};

    fn space_2d(n_per_dim: usize) -> Arc<ConfigurationSpace> {
        let values: Vec<usize> = (1..=n_per_dim).collect();
        let mut kernel = KernelSpec::new(
            "k",
            "",
            NdRange::new(&[64]).unwrap(),
            NdRange::new(&[1]).unwrap(),
        );
        kernel.add_parameter("A", &values).unwrap();
        kernel.add_parameter("B", &values).unwrap();
        kernel.build_space(&DeviceLimits {
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024, 64],
            max_work_item_dimensions: 3,
            local_memory_bytes: 1 << 20,
        })
    }

    #[test]
    fn respects_budget_and_stays_legal() {
        let space = space_2d(10);
        let size = space.len();
        let mut search = Annealing::with_seed(Arc::clone(&space), 0.25, 2.0, 3);
        assert_eq!(search.num_visits(), 25);
        for _ in 0..search.num_visits() {
            let values: Vec<usize> = search.next().iter().map(|s| s.value).collect();
            let index = space.position_of(&values).expect("legal configuration");
            assert!(index < size);
            // Ascending synthetic landscape.
            search.report(index as f64 + 1.0);
            search.advance();
        }
    }

    #[test]
    fn converges_toward_cheap_configurations() {
        // With a low temperature and a landscape equal to the index, the
        // walker should end at a cost no worse than where it started.
        let space = space_2d(8);
        let mut search = Annealing::with_seed(Arc::clone(&space), 1.0, 0.1, 9);
        let mut first = None;
        let mut best_accepted = f64::INFINITY;
        for _ in 0..search.num_visits() {
            let values: Vec<usize> = search.next().iter().map(|s| s.value).collect();
            let index = space.position_of(&values).unwrap();
            let time = index as f64 + 1.0;
            first.get_or_insert(time);
            search.report(time);
            search.advance();
            best_accepted = best_accepted.min(search.accepted_time);
        }
        assert!(best_accepted <= first.unwrap());
    }

    #[test]
    fn failed_candidates_are_never_accepted_over_finite_state() {
        let space = space_2d(4);
        let mut search = Annealing::with_seed(space, 1.0, 5.0, 1);
        search.report(3.0);
        search.advance();
        let accepted = search.accepted;
        search.report(f64::INFINITY);
        search.advance();
        assert_eq!(search.accepted, accepted);
        assert_eq!(search.accepted_time, 3.0);
    }

    #[test]
    fn log_contains_one_entry_per_visit() {
        let space = space_2d(10);
        let mut search = Annealing::with_seed(space, 0.25, 2.0, 17);
        for step in 0..search.num_visits() {
            search.report(step as f64);
            search.advance();
        }
        let mut log = Vec::new();
        search.write_log(&mut log).unwrap();
        let lines = String::from_utf8(log).unwrap().lines().count();
        assert_eq!(lines, 25 + 1);
    }
}
