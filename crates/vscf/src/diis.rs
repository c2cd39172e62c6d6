use std::collections::VecDeque;

use nalgebra::{DVectorView, LU};
use vhci::{Dmat, Dvec};

/// the commutator `FD - DF` with the density `D = c cᵀ` of the occupied modal
/// `c`. zero when `c` is an eigenvector of `F`
pub(crate) fn fock_error(f: &Dmat, c: DVectorView<f64>) -> Dmat {
    let d = c * c.transpose();
    f * &d - &d * f
}

/// Fock and error matrices for every mode from the last `space` iterations
pub(crate) struct Diis {
    space: usize,
    focks: VecDeque<Vec<Dmat>>,
    errors: VecDeque<Vec<Dmat>>,
}

impl Diis {
    pub(crate) fn new(space: usize) -> Self {
        Self {
            space,
            focks: VecDeque::with_capacity(space + 1),
            errors: VecDeque::with_capacity(space + 1),
        }
    }

    /// store the Fock matrices of one iteration, dropping the oldest entry if
    /// the subspace is full
    pub(crate) fn push(&mut self, focks: &[Dmat], errors: Vec<Dmat>) {
        self.focks.push_back(focks.to_vec());
        self.errors.push_back(errors);
        while self.focks.len() > self.space {
            self.focks.pop_front();
            self.errors.pop_front();
        }
    }

    /// squared norm of the most recent errors, summed over modes
    pub(crate) fn last_error(&self) -> Option<f64> {
        self.errors
            .back()
            .map(|es| es.iter().map(|e| e.norm_squared()).sum())
    }

    /// the combination of stored Fock matrices minimizing the extrapolated
    /// error, or `None` with fewer than two entries or a singular system
    pub(crate) fn extrapolate(&self) -> Option<Vec<Dmat>> {
        let m = self.errors.len();
        if m < 2 {
            return None;
        }
        let mut b = Dmat::zeros(m + 1, m + 1);
        for i in 0..m {
            for j in 0..=i {
                let bij: f64 = self.errors[i]
                    .iter()
                    .zip(&self.errors[j])
                    .map(|(a, b)| a.dot(b))
                    .sum();
                b[(i, j)] = bij;
                b[(j, i)] = bij;
            }
            b[(i, m)] = 1.0;
            b[(m, i)] = 1.0;
        }
        let mut rhs = Dvec::zeros(m + 1);
        rhs[m] = 1.0;
        let coeffs = LU::new(b).solve(&rhs)?;
        if coeffs.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let mut ret: Vec<Dmat> =
            self.focks[0].iter().map(|f| f * coeffs[0]).collect();
        for (k, focks) in self.focks.iter().enumerate().skip(1) {
            for (r, f) in ret.iter_mut().zip(focks) {
                *r += f * coeffs[k];
            }
        }
        Some(ret)
    }
}
