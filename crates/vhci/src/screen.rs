//! heat-bath selection of new basis states

use std::{fmt::Display, str::FromStr};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    basis::{Basis, BasisState},
    connect::{connections, coupling_bound, excitations},
    error::VhciError,
    fc::Potential,
    modal::Modals,
};

#[cfg(test)]
mod tests;

/// the states selected by a screening pass, in the order they were first
/// found
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScreenResult {
    pub states: Vec<BasisState>,

    /// one entry per state for [HbMethod::Exact] (the largest `|H_nm c_m|`)
    /// and [HbMethod::Coupling] (the signed `Σ H_nm c_m`). empty otherwise
    pub couplings: Vec<f64>,

    /// the per-mode highest quanta of `states`, only for [HbMethod::Max]
    pub highest_quanta: Vec<usize>,
}

impl ScreenResult {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// a rule for finding the states outside of `basis` that are coupled to it
/// strongly enough to be worth adding
pub trait ScreeningPolicy: Send + Sync {
    /// screen every state of `basis` with its coefficient in `coeffs` against
    /// the threshold `eps`
    fn screen(
        &self,
        basis: &Basis,
        potential: &Potential,
        modals: &Modals,
        coeffs: &[f64],
        eps: f64,
    ) -> ScreenResult;
}

/// the screening policies selectable in the input file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HbMethod {
    /// heat-bath estimates from the single-path ladder factors
    #[default]
    Orig,

    /// like `Orig`, but never exceeding the per-mode maximum quanta
    Max,

    /// exact Hamiltonian couplings
    Exact,

    /// exact couplings, summed into first-order numerators
    Coupling,
}

impl FromStr for HbMethod {
    type Err = VhciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orig" => Ok(Self::Orig),
            "max" => Ok(Self::Max),
            "exact" => Ok(Self::Exact),
            "coupling" => Ok(Self::Coupling),
            _ => Err(VhciError::Config(format!(
                "unrecognized screening method `{s}`"
            ))),
        }
    }
}

impl Display for HbMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HbMethod::Orig => "orig",
                HbMethod::Max => "max",
                HbMethod::Exact => "exact",
                HbMethod::Coupling => "coupling",
            }
        )
    }
}

impl HbMethod {
    /// the [ScreeningPolicy] for `self`. `max_quanta` is only used by
    /// [HbMethod::Max]
    pub fn policy(&self, max_quanta: &[usize]) -> Box<dyn ScreeningPolicy> {
        match self {
            HbMethod::Orig => Box::new(OrigScreen),
            HbMethod::Max => Box::new(MaxScreen {
                max_quanta: max_quanta.to_vec(),
            }),
            HbMethod::Exact => Box::new(ExactScreen),
            HbMethod::Coupling => Box::new(CouplingScreen),
        }
    }
}

/// heat-bath estimates `|W c_m ∏ L(n,m)|` for every term of the heat-bath list,
/// rejecting states with more quanta in any mode than `max_quanta`, if present
fn estimate_screen(
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
    coeffs: &[f64],
    eps: f64,
    max_quanta: Option<&[usize]>,
) -> Vec<BasisState> {
    let found: Vec<Vec<BasisState>> = basis
        .states()
        .par_iter()
        .zip(coeffs.par_iter())
        .map(|(state, c)| {
            let mut ret = Vec::new();
            let mut seen = FxHashSet::default();
            let c = c.abs();
            for w in &potential.heat_bath {
                let wc = (w.coefficient * c).abs();
                let bound: f64 = w
                    .unique
                    .iter()
                    .zip(&w.powers)
                    .map(|(i, p)| modals.estimate_bound(*i, state.0[*i], *p))
                    .product();
                if wc * bound <= eps {
                    continue;
                }
                excitations(
                    state,
                    w,
                    |i, m, p| modals.targets(i, m, p),
                    |i, n, m, p| modals.estimate(i, n, m, p),
                    |new, est| {
                        if wc * est <= eps || basis.contains(&new) {
                            return;
                        }
                        if let Some(mq) = max_quanta
                            && new.0.iter().zip(mq).any(|(n, q)| n >= q)
                        {
                            return;
                        }
                        if seen.insert(new.clone()) {
                            ret.push(new);
                        }
                    },
                );
            }
            ret
        })
        .collect();
    let mut seen = FxHashSet::default();
    let mut ret = Vec::new();
    for s in found.into_iter().flatten() {
        if seen.insert(s.clone()) {
            ret.push(s);
        }
    }
    ret
}

/// exact couplings `H_nm c_m` above `eps` for every state `n` outside of the
/// basis, grouped by ket
fn exact_couplings(
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
    coeffs: &[f64],
    eps: f64,
) -> Vec<Vec<(BasisState, f64)>> {
    basis
        .states()
        .par_iter()
        .zip(coeffs.par_iter())
        .map(|(state, c)| {
            if c.abs() * coupling_bound(state, potential, modals) <= eps {
                return Vec::new();
            }
            connections(state, potential, modals)
                .into_iter()
                .filter_map(|(n, h)| {
                    let v = h * c;
                    (v.abs() > eps && !basis.contains(&n)).then_some((n, v))
                })
                .collect()
        })
        .collect()
}

/// heat-bath screening with the single-path ladder estimates
pub struct OrigScreen;

impl ScreeningPolicy for OrigScreen {
    fn screen(
        &self,
        basis: &Basis,
        potential: &Potential,
        modals: &Modals,
        coeffs: &[f64],
        eps: f64,
    ) -> ScreenResult {
        ScreenResult {
            states: estimate_screen(
                basis, potential, modals, coeffs, eps, None,
            ),
            ..Default::default()
        }
    }
}

/// [OrigScreen] restricted to states below `max_quanta` in every mode
pub struct MaxScreen {
    pub max_quanta: Vec<usize>,
}

impl ScreeningPolicy for MaxScreen {
    fn screen(
        &self,
        basis: &Basis,
        potential: &Potential,
        modals: &Modals,
        coeffs: &[f64],
        eps: f64,
    ) -> ScreenResult {
        let states = estimate_screen(
            basis,
            potential,
            modals,
            coeffs,
            eps,
            Some(&self.max_quanta),
        );
        let mut highest_quanta = vec![0; basis.nmodes()];
        for s in &states {
            for (h, q) in highest_quanta.iter_mut().zip(&s.0) {
                *h = (*h).max(*q);
            }
        }
        ScreenResult {
            states,
            couplings: Vec::new(),
            highest_quanta,
        }
    }
}

/// screening on the largest exact coupling `max_m |H_nm c_m|`
pub struct ExactScreen;

impl ScreeningPolicy for ExactScreen {
    fn screen(
        &self,
        basis: &Basis,
        potential: &Potential,
        modals: &Modals,
        coeffs: &[f64],
        eps: f64,
    ) -> ScreenResult {
        let mut index: FxHashMap<BasisState, usize> = FxHashMap::default();
        let mut ret = ScreenResult::default();
        for (n, v) in exact_couplings(basis, potential, modals, coeffs, eps)
            .into_iter()
            .flatten()
        {
            let v = v.abs();
            if let Some(i) = index.get(&n) {
                ret.couplings[*i] = ret.couplings[*i].max(v);
            } else {
                index.insert(n.clone(), ret.states.len());
                ret.states.push(n);
                ret.couplings.push(v);
            }
        }
        ret
    }
}

/// the states of [ExactScreen] with the signed first-order numerators
/// `Σ_m H_nm c_m`, summed over the kets where `|H_nm c_m| > eps`
pub struct CouplingScreen;

impl ScreeningPolicy for CouplingScreen {
    fn screen(
        &self,
        basis: &Basis,
        potential: &Potential,
        modals: &Modals,
        coeffs: &[f64],
        eps: f64,
    ) -> ScreenResult {
        let mut index: FxHashMap<BasisState, usize> = FxHashMap::default();
        let mut ret = ScreenResult::default();
        for (n, v) in exact_couplings(basis, potential, modals, coeffs, eps)
            .into_iter()
            .flatten()
        {
            if let Some(i) = index.get(&n) {
                ret.couplings[*i] += v;
            } else {
                index.insert(n.clone(), ret.states.len());
                ret.states.push(n);
                ret.couplings.push(v);
            }
        }
        ret
    }
}
