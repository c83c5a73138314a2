//! Sampling without replacement over contiguous bins of a global index space.

use anyhow::{Result, bail, ensure};
use rand::{Rng, seq::index};
use serde::{Deserialize, Serialize};

/// A count given either as a single number or as one number per bin.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Counts {
    Flat(usize),
    Binned(Vec<usize>),
}

impl Counts {
    /// Sum over all bins.
    pub fn total(&self) -> usize {
        match self {
            Counts::Flat(n) => *n,
            Counts::Binned(n_vec) => n_vec.iter().sum(),
        }
    }
}

/// Draw `amount` distinct indices from `start..start + len`.
fn sample_range<R: Rng + ?Sized>(
    rng: &mut R,
    start: usize,
    len: usize,
    amount: usize,
) -> Result<impl Iterator<Item = usize>> {
    ensure!(
        amount <= len,
        "cannot sample {amount} distinct values from a range of size {len}"
    );
    Ok(index::sample(rng, len, amount)
        .into_iter()
        .map(move |idx| start + idx))
}

/// Draw `amount` distinct indices uniformly from `0..size`.
pub fn sample_flat<R: Rng + ?Sized>(rng: &mut R, amount: usize, size: usize) -> Result<Vec<usize>> {
    Ok(sample_range(rng, 0, size, amount)?.collect())
}

/// Draw `amount` distinct indices uniformly from the concatenation of all bins.
///
/// No particular number of indices per bin is guaranteed.
pub fn sample_pooled<R: Rng + ?Sized>(
    rng: &mut R,
    amount: usize,
    sizes: &[usize],
) -> Result<Vec<usize>> {
    sample_flat(rng, amount, sizes.iter().sum())
}

/// Draw exactly `amounts[i]` distinct indices from bin `i` of the concatenation.
pub fn sample_binned<R: Rng + ?Sized>(
    rng: &mut R,
    amounts: &[usize],
    sizes: &[usize],
) -> Result<Vec<usize>> {
    ensure!(
        amounts.len() == sizes.len(),
        "expected {} bin counts, but got {}",
        sizes.len(),
        amounts.len()
    );
    let mut sample = Vec::with_capacity(amounts.iter().sum());
    let mut start = 0;
    for (i_bin, (&amount, &size)) in amounts.iter().zip(sizes).enumerate() {
        let bin = sample_range(rng, start, size, amount).map_err(|error| {
            error.context(format!("failed to sample bin {i_bin}"))
        })?;
        sample.extend(bin);
        start += size;
    }
    Ok(sample)
}

/// Dispatch on the shapes of `amount` and `size`.
pub fn binned_sample<R: Rng + ?Sized>(
    rng: &mut R,
    amount: &Counts,
    size: &Counts,
) -> Result<Vec<usize>> {
    match (amount, size) {
        (Counts::Flat(amount), Counts::Flat(size)) => sample_flat(rng, *amount, *size),
        (Counts::Flat(amount), Counts::Binned(sizes)) => sample_pooled(rng, *amount, sizes),
        (Counts::Binned(amounts), Counts::Binned(sizes)) => sample_binned(rng, amounts, sizes),
        (Counts::Binned(_), Counts::Flat(_)) => {
            bail!("per-bin counts require a binned population size")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use std::collections::BTreeSet;

    fn rng() -> ChaCha12Rng {
        ChaCha12Rng::seed_from_u64(7)
    }

    #[test]
    fn flat_sample_is_distinct_and_in_range() {
        let mut rng = rng();
        for _ in 0..100 {
            let sample = sample_flat(&mut rng, 10, 15).unwrap();
            let set: BTreeSet<_> = sample.iter().copied().collect();
            assert_eq!(set.len(), 10);
            assert!(sample.iter().all(|&idx| idx < 15));
        }
    }

    #[test]
    fn full_flat_sample_covers_range() {
        let mut rng = rng();
        let mut sample = sample_flat(&mut rng, 20, 20).unwrap();
        sample.sort();
        assert_eq!(sample, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn pooled_sample_spans_all_bins() {
        let mut rng = rng();
        let sizes = [5, 5, 5];
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            let sample = sample_pooled(&mut rng, 3, &sizes).unwrap();
            let set: BTreeSet<_> = sample.iter().copied().collect();
            assert_eq!(set.len(), 3);
            assert!(sample.iter().all(|&idx| idx < 15));
            seen.extend(set);
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn binned_sample_respects_per_bin_counts() {
        let mut rng = rng();
        let sizes = [5, 7, 3];
        let amounts = [2, 7, 0];
        for _ in 0..100 {
            let sample = sample_binned(&mut rng, &amounts, &sizes).unwrap();
            let set: BTreeSet<_> = sample.iter().copied().collect();
            assert_eq!(set.len(), 9);
            assert_eq!(sample.iter().filter(|&&idx| idx < 5).count(), 2);
            assert_eq!(sample.iter().filter(|&&idx| (5..12).contains(&idx)).count(), 7);
            assert!(sample.iter().all(|&idx| idx < 12));
        }
    }

    #[test]
    fn binned_sample_handles_last_bin_boundary() {
        let mut rng = rng();
        let sample = sample_binned(&mut rng, &[0, 0, 3], &[5, 5, 3]).unwrap();
        let set: BTreeSet<_> = sample.into_iter().collect();
        assert_eq!(set, BTreeSet::from([10, 11, 12]));
    }

    #[test]
    fn oversized_requests_fail() {
        let mut rng = rng();
        assert!(sample_flat(&mut rng, 6, 5).is_err());
        assert!(sample_pooled(&mut rng, 11, &[5, 5]).is_err());
        assert!(sample_binned(&mut rng, &[1, 6], &[5, 5]).is_err());
    }

    #[test]
    fn mismatched_shapes_fail() {
        let mut rng = rng();
        assert!(sample_binned(&mut rng, &[1, 1], &[5, 5, 5]).is_err());
        assert!(
            binned_sample(&mut rng, &Counts::Binned(vec![1, 1]), &Counts::Flat(10)).is_err()
        );
    }

    #[test]
    fn dispatch_selects_mode() {
        let mut rng = rng();
        let sample = binned_sample(&mut rng, &Counts::Flat(3), &Counts::Flat(15)).unwrap();
        assert_eq!(sample.len(), 3);
        let sample =
            binned_sample(&mut rng, &Counts::Flat(4), &Counts::Binned(vec![2, 2])).unwrap();
        assert_eq!(sample.len(), 4);
        let sample = binned_sample(
            &mut rng,
            &Counts::Binned(vec![1, 1, 1]),
            &Counts::Binned(vec![5, 5, 5]),
        )
        .unwrap();
        let mut bins: Vec<_> = sample.iter().map(|idx| idx / 5).collect();
        bins.sort();
        assert_eq!(bins, vec![0, 1, 2]);
    }
}
