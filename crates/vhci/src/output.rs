use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{Dmat, basis::Basis};

/// coefficients smaller than this are left out of the printed linear
/// combinations
const LC_THRESH: f64 = 1e-2;

/// contains all of the output data from running VHCI
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Output {
    /// variational energies
    pub energies: Vec<f64>,

    /// variational energies plus the PT2 corrections, for the corrected states
    pub energies_pt2: Option<Vec<f64>>,

    /// standard errors of stochastic PT2 corrections
    pub stderr_pt2: Option<Vec<f64>>,

    pub basis_size: usize,

    pub highest_quanta: Vec<usize>,

    /// the label of the largest component of each state, like `w1 + 2w3`
    pub labels: Vec<String>,

    /// the significant components of each state
    pub combinations: Vec<String>,
}

impl Output {
    pub fn new(
        energies: Vec<f64>,
        vectors: &Dmat,
        basis: &Basis,
        energies_pt2: Option<Vec<f64>>,
        stderr_pt2: Option<Vec<f64>>,
    ) -> Self {
        let mut labels = Vec::new();
        let mut combinations = Vec::new();
        for col in vectors.column_iter() {
            let mut comps: Vec<_> = col
                .iter()
                .enumerate()
                .filter(|(_, c)| c.abs() > LC_THRESH)
                .collect();
            comps.sort_by(|(_, a), (_, b)| b.abs().total_cmp(&a.abs()));
            labels.push(basis[col.iamax()].label());
            combinations.push(
                comps
                    .iter()
                    .map(|(i, c)| format!("{c:+.4}({})", basis[*i].label()))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        Self {
            energies,
            energies_pt2,
            stderr_pt2,
            basis_size: basis.len(),
            highest_quanta: basis.highest_quanta().to_vec(),
            labels,
            combinations,
        }
    }
}

impl Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "basis size: {}", self.basis_size)?;
        writeln!(f, "highest quanta: {:?}", self.highest_quanta)?;
        for (i, e) in self.energies.iter().enumerate() {
            let e = self
                .energies_pt2
                .as_ref()
                .and_then(|v| v.get(i))
                .unwrap_or(e);
            write!(f, "{e:.8}")?;
            if let Some(err) = self.stderr_pt2.as_ref().and_then(|v| v.get(i)) {
                write!(f, "\t+/- {err:.8E}")?;
            }
            writeln!(f, "\t\t{}\t{}", self.labels[i], self.combinations[i])?;
        }
        Ok(())
    }
}
