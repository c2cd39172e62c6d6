//! vibrational self-consistent field modals for VHCI

use std::{error::Error, fmt::Display};

use log::{debug, info, warn};
use vhci::{
    Config, Dmat, Dvec, Potential, VhciError, VscfModals, VscfOptions,
    eigen::{Spectrum, diagonalize_dense},
    modal::{MAX_POWER, ladder_matrix},
};

use diis::{Diis, fock_error};

mod diis;

#[cfg(test)]
mod tests;

#[derive(Debug, PartialEq)]
pub enum VscfError {
    /// the SCF iterations hit `max_iter` before the modals converged
    NonConvergence { iterations: usize, energy: f64 },

    Vhci(VhciError),
}

impl Display for VscfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VscfError::NonConvergence { iterations, energy } => write!(
                f,
                "VSCF did not converge after {iterations} iterations, last \
                 energy {energy:.8}"
            ),
            VscfError::Vhci(e) => write!(f, "{e}"),
        }
    }
}

impl Error for VscfError {}

impl From<VhciError> for VscfError {
    fn from(value: VhciError) -> Self {
        Self::Vhci(value)
    }
}

/// a VSCF calculation for the ground state, expanding each modal in the
/// harmonic oscillator functions of its mode
#[derive(Debug)]
pub struct Vscf {
    pub frequencies: Vec<f64>,
    pub potential: Potential,
    pub options: VscfOptions,

    /// modal coefficients for each mode, with the modals in the columns in
    /// order of increasing energy
    pub cs: Vec<Dmat>,

    /// modal energies for each mode
    pub es: Vec<Dvec>,

    /// the expectation value of the Hamiltonian over the occupied modals
    pub energy: f64,

    pub iterations: usize,

    /// the harmonic part of the one-mode Hamiltonian
    harm: Vec<Dmat>,

    /// `(a + a†)^p` for each mode and each p up to [MAX_POWER]
    xs: Vec<Vec<Dmat>>,
}

impl Vscf {
    /// start from harmonic modals with `max_quanta[i]` functions for mode `i`
    pub fn new(
        frequencies: Vec<f64>,
        potential: Potential,
        max_quanta: &[usize],
        options: VscfOptions,
    ) -> Result<Self, VscfError> {
        if frequencies.len() != max_quanta.len()
            || potential.nmodes != frequencies.len()
        {
            return Err(VhciError::Config(format!(
                "VSCF needs one max_quanta and one potential mode per \
                 frequency, got {}, {}, and {}",
                max_quanta.len(),
                potential.nmodes,
                frequencies.len()
            ))
            .into());
        }
        let harm: Vec<_> = frequencies
            .iter()
            .zip(max_quanta)
            .map(|(w, q)| {
                Dmat::from_fn(*q, *q, |k, l| {
                    if k == l { w * (k as f64 + 0.5) } else { 0.0 }
                })
            })
            .collect();
        let xs = max_quanta
            .iter()
            .map(|q| (0..=MAX_POWER).map(|p| ladder_matrix(*q, p)).collect())
            .collect();
        let es = harm.iter().map(|h| h.diagonal()).collect();
        let cs = max_quanta.iter().map(|q| Dmat::identity(*q, *q)).collect();
        let mut ret = Self {
            frequencies,
            potential,
            options,
            cs,
            es,
            energy: 0.0,
            iterations: 0,
            harm,
            xs,
        };
        ret.energy = ret.expectation();
        Ok(ret)
    }

    /// set up from the frequencies, force constants, `max_quanta`, and `vscf`
    /// options in `config`, using the default options if `vscf` is unset
    pub fn from_config(config: &Config) -> Result<Self, VscfError> {
        let potential =
            Potential::from_raw(config.nmodes(), &config.force_constants)?;
        Self::new(
            config.frequencies.clone(),
            potential,
            &config.max_quanta,
            config.vscf.unwrap_or_default(),
        )
    }

    pub fn nmodes(&self) -> usize {
        self.frequencies.len()
    }

    /// `<φ_i|(a + a†)^p|φ_i>` for the occupied modal of each mode and p
    fn occupied_integrals(&self) -> Vec<Vec<f64>> {
        self.cs
            .iter()
            .zip(&self.xs)
            .map(|(c, xs)| {
                let c = c.column(0);
                xs.iter().map(|x| c.dot(&(x * c))).collect()
            })
            .collect()
    }

    /// the energy of the product of the occupied modals
    pub fn expectation(&self) -> f64 {
        let ints = self.occupied_integrals();
        let one: f64 = self
            .cs
            .iter()
            .zip(&self.harm)
            .map(|(c, h)| {
                let c = c.column(0);
                c.dot(&(h * c))
            })
            .sum();
        let terms: f64 = self
            .potential
            .list()
            .map(|w| {
                w.coefficient
                    * w.unique
                        .iter()
                        .zip(&w.powers)
                        .map(|(i, p)| ints[*i][*p])
                        .product::<f64>()
            })
            .sum();
        one + terms
    }

    /// the mean-field operator for each mode: the harmonic part plus every
    /// force constant involving the mode, averaged over the occupied modals
    /// of the other modes
    pub fn focks(&self) -> Vec<Dmat> {
        let ints = self.occupied_integrals();
        (0..self.nmodes())
            .map(|i| {
                let mut f = self.harm[i].clone();
                for w in self.potential.list() {
                    let Some(k) = w.unique.iter().position(|m| *m == i) else {
                        continue;
                    };
                    let rest: f64 = w
                        .unique
                        .iter()
                        .zip(&w.powers)
                        .filter(|(m, _)| **m != i)
                        .map(|(m, p)| ints[*m][*p])
                        .product();
                    f += &self.xs[i][w.powers[k]] * (w.coefficient * rest);
                }
                f
            })
            .collect()
    }

    /// iterate until the change in the modal coefficients is below `tol` and
    /// the change in the energy is below `etol`. returns the number of
    /// iterations
    pub fn scf(&mut self) -> Result<usize, VscfError> {
        let VscfOptions {
            diis,
            diis_space,
            diis_start,
            max_iter,
            tol,
            etol,
        } = self.options;
        let mut diis = diis.then(|| Diis::new(diis_space));
        for iter in 1..=max_iter {
            let mut focks = self.focks();
            if let Some(diis) = &mut diis {
                let errors = focks
                    .iter()
                    .zip(&self.cs)
                    .map(|(f, c)| fock_error(f, c.column(0)))
                    .collect();
                diis.push(&focks, errors);
                let err = diis.last_error().unwrap_or(0.0);
                debug!("VSCF iteration {iter}: DIIS error {err:.3e}");
                // a converged subspace makes the DIIS equations singular
                if iter > diis_start && err > tol {
                    match diis.extrapolate() {
                        Some(f) => focks = f,
                        None => warn!(
                            "DIIS extrapolation failed at iteration {iter}"
                        ),
                    }
                }
            }
            let mut dc = 0.0;
            for (i, f) in focks.into_iter().enumerate() {
                let n = f.nrows();
                let Spectrum {
                    energies,
                    mut vectors,
                } = diagonalize_dense(f, n);
                for mut col in vectors.column_iter_mut() {
                    if col[col.iamax()] < 0.0 {
                        col.neg_mut();
                    }
                }
                dc += (vectors.abs() - self.cs[i].abs()).norm_squared();
                self.cs[i] = vectors;
                self.es[i] = energies;
            }
            let energy = self.expectation();
            let de = (energy - self.energy).abs();
            self.energy = energy;
            info!(
                "VSCF iteration {iter}: energy {energy:.10}, dC = {dc:.3e}, \
                 dE = {de:.3e}"
            );
            if dc <= tol && de <= etol {
                self.iterations = iter;
                return Ok(iter);
            }
        }
        self.iterations = max_iter;
        Err(VscfError::NonConvergence {
            iterations: max_iter,
            energy: self.energy,
        })
    }

    /// the current modals in the form used to build the VHCI Hamiltonian
    pub fn modals(&self) -> Result<VscfModals, VhciError> {
        VscfModals::new(self.frequencies.clone(), self.cs.clone())
    }
}

impl Display for Vscf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "VSCF energy: {:.8}", self.energy)?;
        writeln!(f, "iterations: {}", self.iterations)?;
        writeln!(f, "{:>5}{:>16}{:>16}", "mode", "freq", "e1 - e0")?;
        for (i, (w, e)) in self.frequencies.iter().zip(&self.es).enumerate() {
            let fund = if e.len() > 1 { e[1] - e[0] } else { 0.0 };
            writeln!(f, "{:5}{w:16.8}{fund:16.8}", i + 1)?;
        }
        Ok(())
    }
}
