//! Particle swarm optimisation over the positional encoding of the space.
//!
//! A particle's position is the vector of per-parameter value-list indices;
//! velocities live in the continuous domain and are quantized to a single
//! step per dimension when the particle moves.

use crate::record::SearchRecord;
use crate::{budget, clock_seed, Searcher};
use std::io::{self, Write};
use std::sync::Arc;
use tunesmith_space::{Configuration, ConfigurationSpace};

struct Particle {
    /// Value-list index per parameter dimension.
    position: Vec<usize>,
    velocity: Vec<f64>,
    best: Option<(Vec<usize>, f64)>,
}

pub struct Pso {
    record: SearchRecord,
    visits: usize,
    inertia: f64,
    cognitive: f64,
    social: f64,
    rng: fastrand::Rng,
    swarm: Vec<Particle>,
    global_best: Option<(Vec<usize>, f64)>,
    active: usize,
}

impl Pso {
    pub fn new(
        space: Arc<ConfigurationSpace>,
        fraction: f64,
        swarm_size: usize,
        inertia: f64,
        cognitive: f64,
        social: f64,
    ) -> Self {
        Self::with_seed(
            space,
            fraction,
            swarm_size,
            inertia,
            cognitive,
            social,
            clock_seed(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_seed(
        space: Arc<ConfigurationSpace>,
        fraction: f64,
        swarm_size: usize,
        inertia: f64,
        cognitive: f64,
        social: f64,
        seed: u64,
    ) -> Self {
        let visits = budget(fraction, space.len());
        let mut rng = fastrand::Rng::with_seed(seed);
        let dims = space.parameters().len();

        let swarm: Vec<Particle> = (0..swarm_size.max(1))
            .map(|_| {
                let index = rng.usize(..space.len());
                Particle {
                    position: Self::encode(&space, index),
                    velocity: vec![0.0; dims],
                    best: None,
                }
            })
            .collect();

        let mut record = SearchRecord::new(space);
        record.current = Self::decode(record.space(), &swarm[0].position);
        Self {
            record,
            visits,
            inertia,
            cognitive,
            social,
            rng,
            swarm,
            global_best: None,
            active: 0,
        }
    }

    /// Configuration index -> per-parameter value-list indices.
    fn encode(space: &ConfigurationSpace, index: usize) -> Vec<usize> {
        let values = space.values_at(index);
        space
            .parameters()
            .iter()
            .zip(&values)
            .map(|(parameter, value)| {
                parameter
                    .values
                    .iter()
                    .position(|v| v == value)
                    .expect("value taken from the parameter's own list")
            })
            .collect()
    }

    /// Per-parameter value-list indices -> configuration index. Positions
    /// held by particles always correspond to legal configurations.
    fn decode(space: &ConfigurationSpace, position: &[usize]) -> usize {
        let values: Vec<usize> = space
            .parameters()
            .iter()
            .zip(position)
            .map(|(parameter, &i)| parameter.values[i])
            .collect();
        space
            .position_of(&values)
            .expect("particle position is legal")
    }

    fn move_particle(&mut self, p: usize) {
        let space = Arc::clone(self.record.space());
        let parameters = space.parameters();
        let particle = &mut self.swarm[p];

        let mut candidate = particle.position.clone();
        for d in 0..candidate.len() {
            let pos = particle.position[d] as f64;
            let pbest = particle
                .best
                .as_ref()
                .map_or(pos, |(best, _)| best[d] as f64);
            let gbest = self
                .global_best
                .as_ref()
                .map_or(pos, |(best, _)| best[d] as f64);

            let r1 = self.rng.f64();
            let r2 = self.rng.f64();
            particle.velocity[d] = self.inertia * particle.velocity[d]
                + self.cognitive * r1 * (pbest - pos)
                + self.social * r2 * (gbest - pos);

            // Quantize to one step along the value list.
            let step = particle.velocity[d].round().clamp(-1.0, 1.0) as i64;
            let moved = (particle.position[d] as i64 + step)
                .clamp(0, parameters[d].values.len() as i64 - 1);
            candidate[d] = moved as usize;
        }

        let values: Vec<usize> = parameters
            .iter()
            .zip(&candidate)
            .map(|(parameter, &i)| parameter.values[i])
            .collect();
        // Illegal composites skip the move for this step.
        if space.position_of(&values).is_some() {
            particle.position = candidate;
        }
    }
}

impl Searcher for Pso {
    fn num_visits(&self) -> usize {
        self.visits
    }

    fn next(&self) -> &Configuration {
        self.record.current_configuration()
    }

    fn report(&mut self, time_ms: f64) {
        self.record.report(time_ms);
        let particle = &mut self.swarm[self.active];
        let position = particle.position.clone();
        if time_ms.is_finite() {
            if particle.best.as_ref().map_or(true, |(_, t)| time_ms < *t) {
                particle.best = Some((position.clone(), time_ms));
            }
            if self
                .global_best
                .as_ref()
                .map_or(true, |(_, t)| time_ms < *t)
            {
                self.global_best = Some((position, time_ms));
            }
        }
    }

    fn advance(&mut self) {
        // Round-robin across the swarm; the next particle moves before it
        // is evaluated.
        self.active = (self.active + 1) % self.swarm.len();
        self.move_particle(self.active);
        self.record.current = Self::decode(self.record.space(), &self.swarm[self.active].position);
    }

    fn write_log(&self, sink: &mut dyn Write) -> io::Result<()> {
        self.record.write_log(sink)
    }
}
