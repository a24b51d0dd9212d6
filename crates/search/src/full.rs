//! Exhaustive search in generation order.

use crate::record::SearchRecord;
use crate::Searcher;
use std::io::{self, Write};
use std::sync::Arc;
use tunesmith_space::{Configuration, ConfigurationSpace};

pub struct FullSearch {
    record: SearchRecord,
}

impl FullSearch {
    pub fn new(space: Arc<ConfigurationSpace>) -> Self {
        Self {
            record: SearchRecord::new(space),
        }
    }
}

impl Searcher for FullSearch {
    fn num_visits(&self) -> usize {
        self.record.space().len()
    }

    fn next(&self) -> &Configuration {
        self.record.current_configuration()
    }

    fn report(&mut self, time_ms: f64) {
        self.record.report(time_ms);
    }

    fn advance(&mut self) {
        let last = self.record.space().len().saturating_sub(1);
        self.record.current = (self.record.current + 1).min(last);
    }

    fn write_log(&self, sink: &mut dyn Write) -> io::Result<()> {
        self.record.write_log(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesmith_space::{DeviceLimits, KernelSpec, NdRange};

    fn space(values: &[usize]) -> Arc<ConfigurationSpace> {
        let mut kernel = KernelSpec::new(
            "k",
            "",
            NdRange::new(&[64]).unwrap(),
            NdRange::new(&[1]).unwrap(),
        );
        kernel.add_parameter("V", values).unwrap();
        kernel.build_space(&DeviceLimits {
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024, 64],
            max_work_item_dimensions: 3,
            local_memory_bytes: 1 << 20,
        })
    }

    #[test]
    fn visits_every_index_in_generation_order() {
        let mut search = FullSearch::new(space(&[1, 2, 3]));
        assert_eq!(search.num_visits(), 3);
        let mut seen = Vec::new();
        for _ in 0..search.num_visits() {
            seen.push(search.next()[0].value);
            search.report(1.0);
            search.advance();
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn order_is_reproducible() {
        let run = || {
            let mut search = FullSearch::new(space(&[4, 8, 16, 32]));
            let mut seen = Vec::new();
            for _ in 0..search.num_visits() {
                seen.push(search.next()[0].value);
                search.report(0.0);
                search.advance();
            }
            seen
        };
        assert_eq!(run(), run());
    }
}
