//! Agents, population and the random distributions they are drawn from.

use crate::config::Config;
use crate::sampling::{Counts, binned_sample};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::{Bernoulli, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Disease state of a susceptible agent.
pub const SUSCEPTIBLE: i32 = -1;
/// Disease state of a recovered (fully immune) agent.
pub const RECOVERED: i32 = 0;

/// Upper bound of the natural immunity gained from repeated infections.
pub const MAX_NATURAL_IMMUNITY: f64 = 0.9;

/// Agent of the simulation.
///
/// `state` is `-1` when susceptible, `0` when recovered, and otherwise counts down the
/// remaining days of infection: `1..=days_inf` infected, above that exposed.
/// The protection fields are probabilities of blocking a single exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub state: i32,
    pub vaccine: f64,
    pub mask: f64,
    pub natural_immunity: f64,
    /// Isolation adherence, set when the agent gets infected.
    pub isolation: Option<f64>,
    /// Subgroup index, only in a subgrouped population.
    pub group: Option<usize>,
}

impl Agent {
    fn new(vaccine: f64, mask: f64, group: Option<usize>) -> Self {
        Self {
            state: SUSCEPTIBLE,
            vaccine,
            mask,
            natural_immunity: 0.0,
            isolation: None,
            group,
        }
    }
}

/// Distributions derived from the configuration, built once per run.
pub struct Dists {
    pub vac: Bernoulli,
    pub mask: Bernoulli,
    pub asym: Bernoulli,
    pub iso: Bernoulli,
    /// Becoming susceptible again at the end of an infection.
    pub relapse: Bernoulli,
    pub trans_exp: Bernoulli,
    pub trans_inf: Bernoulli,
    /// Effectiveness of an adopted intervention.
    pub eff: Uniform<f64>,
    /// Natural immunity gained from one infection.
    pub imm_gain: Uniform<f64>,
    /// Number of daily contacts.
    pub n_contacts: Uniform<usize>,
}

impl Dists {
    pub fn new(cfg: &Config) -> Result<Self> {
        let pop = &cfg.population;
        let dis = &cfg.disease;
        Ok(Self {
            vac: Bernoulli::new(pop.prob_vac)?,
            mask: Bernoulli::new(pop.prob_mask)?,
            asym: Bernoulli::new(dis.prob_asym)?,
            iso: Bernoulli::new(dis.prob_iso)?,
            relapse: Bernoulli::new(1.0 - dis.prob_rec)?,
            trans_exp: Bernoulli::new(dis.prob_trans_exp)?,
            trans_inf: Bernoulli::new(dis.prob_trans_inf)?,
            eff: Uniform::new(0.0, 1.0)?,
            imm_gain: Uniform::new(0.0, 0.5)?,
            n_contacts: Uniform::new_inclusive(0, cfg.contact.max_contacts)?,
        })
    }

    /// Effectiveness of an intervention adopted with the probability of `adopt`, else `0`.
    pub fn adopt<R: Rng + ?Sized>(&self, adopt: &Bernoulli, rng: &mut R) -> f64 {
        if adopt.sample(rng) {
            self.eff.sample(rng)
        } else {
            0.0
        }
    }

    /// Mark `agt` as freshly infected and decide its isolation adherence.
    pub fn infect<R: Rng + ?Sized>(&self, agt: &mut Agent, onset: i32, rng: &mut R) {
        agt.state = onset;
        // Asymptomatic agents do not know to isolate.
        let isolation = if self.asym.sample(rng) {
            0.0
        } else {
            self.adopt(&self.iso, rng)
        };
        agt.isolation = Some(isolation);
    }
}

/// Fixed set of agents, optionally partitioned into contiguous subgroups.
pub struct Population {
    agt_vec: Vec<Agent>,
    grp_sizes: Option<Vec<usize>>,
}

impl Population {
    /// Build the population and return it together with the initially infected indices.
    pub fn create<R: Rng + ?Sized>(
        cfg: &Config,
        dists: &Dists,
        rng: &mut R,
    ) -> Result<(Self, BTreeSet<usize>)> {
        let n_agt = &cfg.population.n_agt;
        let mut agt_vec = Vec::with_capacity(n_agt.total());
        let grp_sizes = match n_agt {
            Counts::Flat(n_agt) => {
                for _ in 0..*n_agt {
                    let vaccine = dists.adopt(&dists.vac, rng);
                    let mask = dists.adopt(&dists.mask, rng);
                    agt_vec.push(Agent::new(vaccine, mask, None));
                }
                None
            }
            Counts::Binned(grp_sizes) => {
                for (grp, &size) in grp_sizes.iter().enumerate() {
                    for _ in 0..size {
                        let vaccine = dists.adopt(&dists.vac, rng);
                        let mask = dists.adopt(&dists.mask, rng);
                        agt_vec.push(Agent::new(vaccine, mask, Some(grp)));
                    }
                }
                Some(grp_sizes.clone())
            }
        };

        let mut pop = Self { agt_vec, grp_sizes };

        let sample = binned_sample(rng, &cfg.population.n_inf, n_agt)
            .context("failed to select initially infected agents")?;
        let onset = cfg.disease.onset();
        for &i_agt in &sample {
            dists.infect(&mut pop.agt_vec[i_agt], onset, rng);
        }

        Ok((pop, sample.into_iter().collect()))
    }

    pub fn len(&self) -> usize {
        self.agt_vec.len()
    }

    #[cfg(test)]
    pub fn agents(&self) -> &[Agent] {
        &self.agt_vec
    }

    pub fn agent(&self, i_agt: usize) -> &Agent {
        &self.agt_vec[i_agt]
    }

    pub fn agent_mut(&mut self, i_agt: usize) -> &mut Agent {
        &mut self.agt_vec[i_agt]
    }

    /// Sizes of the subgroups, if any.
    pub fn grp_sizes(&self) -> Option<&[usize]> {
        self.grp_sizes.as_deref()
    }
}
