//! second-order perturbative corrections to the variational energies

use std::collections::BTreeMap;

use log::debug;
use rand::{
    SeedableRng,
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::{
    Dmat, Dvec,
    basis::{Basis, BasisState},
    connect::{connections, diagonal},
    error::VhciError,
    fc::Potential,
    modal::Modals,
    screen::{CouplingScreen, ScreeningPolicy},
};


/// multiplier for spreading sample indices across the seed space
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// settings for the stochastic estimator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spt2Settings {
    /// number of walkers drawn per sample
    pub n_walkers: usize,

    pub n_samples: usize,

    /// threshold for the sampled part of the semi-stochastic correction
    pub eps3: f64,

    /// split the correction into a deterministic part at `eps2` and a sampled
    /// part between `eps3` and `eps2`
    pub semi_stochastic: bool,

    pub seed: u64,
}

/// deterministic second-order corrections for the lowest `n_states` states,
/// including only the couplings `|H_am C_mk| > eps2`
pub fn pt2(
    energies: &Dvec,
    vectors: &Dmat,
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
    eps2: f64,
    n_states: usize,
) -> Vec<f64> {
    let n_states = n_states.min(vectors.ncols());
    (0..n_states)
        .map(|k| {
            let coeffs: Vec<f64> = vectors.column(k).iter().copied().collect();
            let ext =
                CouplingScreen.screen(basis, potential, modals, &coeffs, eps2);
            let diag: Vec<f64> = ext
                .states
                .par_iter()
                .map(|s| diagonal(s, potential, modals))
                .collect();
            let de: f64 = ext
                .couplings
                .iter()
                .zip(&diag)
                .map(|(num, haa)| num * num / (energies[k] - haa))
                .sum();
            debug!(
                "PT2 state {k}: {} external states, correction {de:.8}",
                ext.len()
            );
            de
        })
        .collect()
}

/// running sums of the estimator for one external state
#[derive(Clone, Copy, Default)]
struct Accum {
    /// `Σ w c H / p`
    first: f64,

    /// `Σ (w (Nd-1) / p - w² / p²) c² H²`
    second: f64,
}

/// per-external sums keyed by first appearance
#[derive(Default)]
struct Externals {
    index: FxHashMap<BasisState, usize>,
    entries: Vec<(BasisState, Accum)>,
}

impl Externals {
    fn add(&mut self, state: &BasisState, first: f64, second: f64) {
        let i = match self.index.get(state) {
            Some(i) => *i,
            None => {
                self.index.insert(state.clone(), self.entries.len());
                self.entries.push((state.clone(), Accum::default()));
                self.entries.len() - 1
            }
        };
        self.entries[i].1.first += first;
        self.entries[i].1.second += second;
    }

    fn estimate(
        &self,
        e: f64,
        nd: f64,
        potential: &Potential,
        modals: &Modals,
    ) -> f64 {
        self.entries
            .iter()
            .map(|(s, a)| {
                (a.first * a.first + a.second)
                    / (nd * (nd - 1.0) * (e - diagonal(s, potential, modals)))
            })
            .sum()
    }
}

/// one sample of the stochastic estimator for state `k` at each of the
/// thresholds in `eps`
#[allow(clippy::too_many_arguments)]
fn sample(
    rng: &mut StdRng,
    dist: &WeightedIndex<f64>,
    probs: &[f64],
    coeffs: &[f64],
    e: f64,
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
    n_walkers: usize,
    eps: &[f64],
) -> Vec<f64> {
    let mut counts = BTreeMap::new();
    for _ in 0..n_walkers {
        *counts.entry(dist.sample(rng)).or_insert(0usize) += 1;
    }
    let nd = n_walkers as f64;
    let mut exts: Vec<Externals> =
        eps.iter().map(|_| Externals::default()).collect();
    for (m, w) in counts {
        let (c, p, w) = (coeffs[m], probs[m], w as f64);
        for (a, h) in connections(&basis[m], potential, modals) {
            if basis.contains(&a) {
                continue;
            }
            let ch = c * h;
            let first = w * ch / p;
            let second = (w * (nd - 1.0) / p - w * w / (p * p)) * ch * ch;
            for (ext, eps) in exts.iter_mut().zip(eps) {
                if ch.abs() > *eps {
                    ext.add(&a, first, second);
                }
            }
        }
    }
    exts.iter()
        .map(|ext| ext.estimate(e, nd, potential, modals))
        .collect()
}

fn mean_and_error(xs: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, (var / n).sqrt())
}

/// stochastic (or semi-stochastic) second-order corrections and their
/// standard errors for the lowest `n_states` states
#[allow(clippy::too_many_arguments)]
pub fn spt2(
    energies: &Dvec,
    vectors: &Dmat,
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
    eps2: f64,
    n_states: usize,
    settings: &Spt2Settings,
) -> Result<(Vec<f64>, Vec<f64>), VhciError> {
    let Spt2Settings {
        n_walkers,
        n_samples,
        eps3,
        semi_stochastic,
        seed,
    } = *settings;
    if n_walkers < 2 || n_samples < 2 {
        return Err(VhciError::Config(format!(
            "stochastic PT2 needs at least 2 walkers and 2 samples, got \
             {n_walkers} and {n_samples}"
        )));
    }
    if semi_stochastic && eps3 >= eps2 {
        return Err(VhciError::Config(format!(
            "eps3 ({eps3}) must be smaller than eps2 ({eps2})"
        )));
    }
    let n_states = n_states.min(vectors.ncols());
    let deterministic = if semi_stochastic {
        pt2(energies, vectors, basis, potential, modals, eps2, n_states)
    } else {
        Vec::new()
    };
    let eps: Vec<f64> = if semi_stochastic {
        vec![eps3, eps2]
    } else {
        vec![eps2]
    };
    let mut de = Vec::with_capacity(n_states);
    let mut se = Vec::with_capacity(n_states);
    for k in 0..n_states {
        let coeffs: Vec<f64> = vectors.column(k).iter().copied().collect();
        let weights: Vec<f64> = coeffs.iter().map(|c| c.abs()).collect();
        let total: f64 = weights.iter().sum();
        let dist = WeightedIndex::new(&weights).map_err(|e| {
            VhciError::Sampling(format!(
                "failed to build the walker distribution for state {k}: {e}"
            ))
        })?;
        let probs: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let samples: Vec<f64> = (0..n_samples)
            .into_par_iter()
            .map(|s| {
                let mut rng = StdRng::seed_from_u64(
                    seed ^ ((k * n_samples + s) as u64).wrapping_mul(SEED_MIX),
                );
                let got = sample(
                    &mut rng,
                    &dist,
                    &probs,
                    &coeffs,
                    energies[k],
                    basis,
                    potential,
                    modals,
                    n_walkers,
                    &eps,
                );
                if semi_stochastic { got[0] - got[1] } else { got[0] }
            })
            .collect();
        let (mean, err) = mean_and_error(&samples);
        let total = if semi_stochastic {
            deterministic[k] + mean
        } else {
            mean
        };
        debug!("SPT2 state {k}: correction {total:.8} +/- {err:.3e}");
        de.push(total);
        se.push(err);
    }
    Ok((de, se))
}
