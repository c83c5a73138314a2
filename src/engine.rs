use crate::config::Config;
use crate::model::{Dists, Population};
use crate::transition::advance;
use crate::transmission::spread;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a simulation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// No infected agents remained.
    Extinguished,
    /// The maximum number of days was reached with infections still active.
    Persists,
}

/// Result of a single simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Seed of the random number generator.
    pub seed: u64,
    /// Number of agents.
    pub n_agt: usize,
    /// Active infections at the start of every day.
    pub curve: Vec<usize>,
    /// Number of infection events, reinfections included.
    pub n_events: usize,
    /// Number of distinct agents infected at least once.
    pub n_unique: usize,
    pub outcome: Outcome,
}

impl Record {
    /// Number of simulated days.
    pub fn duration(&self) -> usize {
        self.curve.len() - 1
    }

    pub fn reinfections(&self) -> usize {
        self.n_events - self.n_unique
    }

    /// Percentage of the population infected at least once.
    pub fn attack_rate(&self) -> f64 {
        100.0 * self.n_unique as f64 / self.n_agt as f64
    }

    /// Largest number of active infections and the first day it occurred.
    pub fn peak(&self) -> (usize, usize) {
        let mut peak = (0, 0);
        for (day, &n_inf) in self.curve.iter().enumerate() {
            if n_inf > peak.1 {
                peak = (day, n_inf);
            }
        }
        peak
    }
}

/// Simulation engine.
///
/// Holds the configuration, population, and random number generator,
/// and advances the epidemic one day at a time.
pub struct Engine {
    cfg: Config,
    dists: Dists,
    pop: Population,
    infected: BTreeSet<usize>,
    ever_infected: Vec<bool>,
    n_unique: usize,
    n_events: usize,
    curve: Vec<usize>,
    seed: u64,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with a freshly generated population.
    pub fn new(cfg: Config, seed: u64) -> Result<Self> {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);

        let dists = Dists::new(&cfg).context("failed to construct distributions")?;
        let (pop, infected) =
            Population::create(&cfg, &dists, &mut rng).context("failed to create population")?;

        let mut ever_infected = vec![false; pop.len()];
        for &i_agt in &infected {
            ever_infected[i_agt] = true;
        }

        Ok(Self {
            n_unique: infected.len(),
            n_events: infected.len(),
            curve: vec![infected.len()],
            cfg,
            dists,
            pop,
            infected,
            ever_infected,
            seed,
            rng,
        })
    }

    /// Simulate one day and return the outcome if the simulation ended.
    ///
    /// The day starts with the state transition; if no infections remain the epidemic
    /// is extinguished, otherwise the infected agents meet their contacts.
    pub fn perform_day(&mut self) -> Result<Option<Outcome>> {
        let infected = std::mem::take(&mut self.infected);
        self.infected = advance(&mut self.pop, infected, &self.dists, &mut self.rng);
        self.curve.push(self.infected.len());

        let day = self.day();
        log::debug!(
            "day {day}: {} of {} agents infected",
            self.infected.len(),
            self.pop.len()
        );

        if self.infected.is_empty() {
            return Ok(Some(Outcome::Extinguished));
        }

        let new_infected = spread(
            &mut self.pop,
            &self.infected,
            &self.cfg,
            &self.dists,
            &mut self.rng,
        )
        .with_context(|| format!("failed to spread infection on day {day}"))?;

        self.n_events += new_infected.len();
        for i_agt in new_infected {
            if !self.ever_infected[i_agt] {
                self.ever_infected[i_agt] = true;
                self.n_unique += 1;
            }
            self.infected.insert(i_agt);
        }

        if day >= self.cfg.run.max_days {
            return Ok(Some(Outcome::Persists));
        }
        Ok(None)
    }

    /// Run the simulation until it ends and return its record.
    pub fn perform_simulation(mut self) -> Result<Record> {
        let outcome = if self.cfg.run.max_days == 0 {
            Outcome::Persists
        } else {
            loop {
                if let Some(outcome) = self.perform_day().context("failed to perform day")? {
                    break outcome;
                }
            }
        };

        Ok(Record {
            seed: self.seed,
            n_agt: self.pop.len(),
            curve: self.curve,
            n_events: self.n_events,
            n_unique: self.n_unique,
            outcome,
        })
    }

    /// Number of days simulated so far.
    pub fn day(&self) -> usize {
        self.curve.len() - 1
    }
}

#[cfg(test)]
impl Engine {
    pub fn curve(&self) -> &[usize] {
        &self.curve
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn n_unique(&self) -> usize {
        self.n_unique
    }

    pub fn infected(&self) -> &BTreeSet<usize> {
        &self.infected
    }

    pub fn population(&self) -> &Population {
        &self.pop
    }
}
