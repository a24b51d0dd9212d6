//! Shared bookkeeping for all strategies: which indices were explored, in
//! what order, and at what measured time.

use std::io::{self, Write};
use std::sync::Arc;
use tunesmith_space::{Configuration, ConfigurationSpace};

pub(crate) struct SearchRecord {
    space: Arc<ConfigurationSpace>,
    times: Vec<f64>,
    explored: Vec<usize>,
    pub(crate) current: usize,
}

impl SearchRecord {
    pub(crate) fn new(space: Arc<ConfigurationSpace>) -> Self {
        let size = space.len();
        Self {
            space,
            times: vec![f64::INFINITY; size],
            explored: Vec::new(),
            current: 0,
        }
    }

    pub(crate) fn space(&self) -> &Arc<ConfigurationSpace> {
        &self.space
    }

    pub(crate) fn current_configuration(&self) -> &Configuration {
        self.space.get(self.current)
    }

    pub(crate) fn report(&mut self, time_ms: f64) {
        self.explored.push(self.current);
        self.times[self.current] = time_ms;
    }

    /// Time of the most recently reported configuration.
    pub(crate) fn last_time(&self) -> Option<f64> {
        self.explored.last().map(|&index| self.times[index])
    }

    pub(crate) fn write_log(&self, sink: &mut dyn Write) -> io::Result<()> {
        writeln!(sink, "step;index;time")?;
        for (step, &index) in self.explored.iter().enumerate() {
            let settings: Vec<String> = self
                .space
                .get(index)
                .iter()
                .map(|setting| setting.to_string())
                .collect();
            writeln!(
                sink,
                "{};{};{:.3} {}",
                step,
                index,
                self.times[index],
                settings.join(" ")
            )?;
        }
        Ok(())
    }
}
