//! Beginning-of-day advance of every infected agent's clock.

use crate::model::{Dists, MAX_NATURAL_IMMUNITY, Population, RECOVERED, SUSCEPTIBLE};
use rand::prelude::*;
use std::collections::BTreeSet;

/// Advance all agents in `infected` by one day and return the agents still infected.
///
/// Agents on their last infected day either become susceptible again, gaining some
/// natural immunity, or recover for good.
pub fn advance<R: Rng + ?Sized>(
    pop: &mut Population,
    infected: BTreeSet<usize>,
    dists: &Dists,
    rng: &mut R,
) -> BTreeSet<usize> {
    let mut still_infected = BTreeSet::new();
    for i_agt in infected {
        let agt = pop.agent_mut(i_agt);
        if agt.state == 1 {
            if dists.relapse.sample(rng) {
                agt.state = SUSCEPTIBLE;
                let gain = dists.imm_gain.sample(rng);
                agt.natural_immunity = (agt.natural_immunity + gain).min(MAX_NATURAL_IMMUNITY);
            } else {
                agt.state = RECOVERED;
            }
        } else if agt.state > 1 {
            agt.state -= 1;
            still_infected.insert(i_agt);
        }
    }
    still_infected
}
