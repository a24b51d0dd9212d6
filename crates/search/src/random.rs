//! Uniform random sampling with replacement.

use crate::record::SearchRecord;
use crate::{budget, clock_seed, Searcher};
use std::io::{self, Write};
use std::sync::Arc;
use tunesmith_space::{Configuration, ConfigurationSpace};

pub struct RandomSearch {
    record: SearchRecord,
    visits: usize,
    rng: fastrand::Rng,
}

impl RandomSearch {
    pub fn new(space: Arc<ConfigurationSpace>, fraction: f64) -> Self {
        Self::with_seed(space, fraction, clock_seed())
    }

    pub fn with_seed(space: Arc<ConfigurationSpace>, fraction: f64, seed: u64) -> Self {
        let visits = budget(fraction, space.len());
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut record = SearchRecord::new(space);
        record.current = rng.usize(..record.space().len());
        Self {
            record,
            visits,
            rng,
        }
    }
}

impl Searcher for RandomSearch {
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
        self.record.current = self.rng.usize(..self.record.space().len());
    }

    fn write_log(&self, sink: &mut dyn Write) -> io::Result<()> {
        self.record.write_log(sink)
    }
}
