//! Daily contacts of infected agents and the transmission decision for each contact.

use crate::config::{Config, group_contacts};
use crate::model::{Agent, Dists, Population, SUSCEPTIBLE};
use crate::sampling::{sample_binned, sample_flat};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use std::collections::BTreeSet;

/// Whether a flip with probability `prob` comes up heads.
fn flip<R: Rng + ?Sized>(prob: f64, rng: &mut R) -> bool {
    rng.random_bool(prob)
}

/// Susceptible and not protected this time by vaccine, mask or natural immunity.
fn is_susceptible<R: Rng + ?Sized>(agt: &Agent, rng: &mut R) -> bool {
    agt.state == SUSCEPTIBLE
        && !flip(agt.vaccine, rng)
        && !flip(agt.mask, rng)
        && !flip(agt.natural_immunity, rng)
}

/// Exposed or infected and not held back this time by mask or isolation.
fn is_infectious<R: Rng + ?Sized>(agt: &Agent, cfg: &Config, rng: &mut R) -> bool {
    cfg.disease.is_active(agt.state)
        && !flip(agt.mask, rng)
        && !flip(agt.isolation.unwrap_or(0.0), rng)
}

/// Sample the contacts of agent `i_agt` for one day.
///
/// In a subgrouped population the contacts are split across groups by the agent's row of
/// the mixing matrix, rounding each group's share independently.
fn sample_contacts<R: Rng + ?Sized>(
    pop: &Population,
    i_agt: usize,
    cfg: &Config,
    dists: &Dists,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let n_contacts = dists.n_contacts.sample(rng);
    match (pop.agent(i_agt).group, pop.grp_sizes(), &cfg.contact.mixing) {
        (Some(grp), Some(grp_sizes), Some(mixing)) => {
            let n_grp_contacts: Vec<_> = mixing[grp]
                .iter()
                .map(|&pct| group_contacts(n_contacts, pct))
                .collect();
            sample_binned(rng, &n_grp_contacts, grp_sizes)
        }
        (None, None, None) => sample_flat(rng, n_contacts, pop.len()),
        _ => bail!("agent {i_agt} has no consistent group and mixing matrix"),
    }
}

/// Let every agent in `infected` meet its daily contacts and return the newly infected.
///
/// Newly infected agents are marked right away, so no agent is infected twice on the
/// same day, but they are not added to `infected` and do not spread until the next day.
pub fn spread<R: Rng + ?Sized>(
    pop: &mut Population,
    infected: &BTreeSet<usize>,
    cfg: &Config,
    dists: &Dists,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let dis = &cfg.disease;
    let onset = dis.onset();
    let mut new_infected = Vec::new();

    for &i_agt in infected {
        let contacts = sample_contacts(pop, i_agt, cfg, dists, rng)
            .with_context(|| format!("failed to sample contacts of agent {i_agt}"))?;

        for j_agt in contacts {
            let src = pop.agent(i_agt);
            let transmits = is_infectious(src, cfg, rng)
                && is_susceptible(pop.agent(j_agt), rng)
                && ((dis.is_exposed(src.state) && dists.trans_exp.sample(rng))
                    || (dis.is_infected(src.state) && dists.trans_inf.sample(rng)));
            if !transmits {
                continue;
            }

            let dst = pop.agent_mut(j_agt);
            dists.infect(dst, onset, rng);
            log::trace!(
                "agent {j_agt} infected by agent {i_agt} [isolation = {:.2}]",
                dst.isolation.unwrap_or(0.0)
            );
            new_infected.push(j_agt);
        }
    }

    Ok(new_infected)
}
