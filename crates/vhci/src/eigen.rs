//! symmetric eigensolvers for the Hamiltonian

use std::cmp::Ordering;

use log::{debug, warn};
use nalgebra::SymmetricEigen;

use crate::{Dmat, Dvec, hamiltonian::SparseHamiltonian};

/// convergence threshold on the Lanczos residual norm, relative to the
/// magnitude of the Ritz value
const LANCZOS_TOL: f64 = 1e-9;

/// maximum number of explicit restarts in [lanczos]
const LANCZOS_RESTARTS: usize = 20;

/// eigenvalues in ascending order and the corresponding eigenvectors in the
/// columns of `vectors`, with rows aligned to the basis
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    pub energies: Dvec,
    pub vectors: Dmat,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }
}

/// the full eigendecomposition of `mat`, sorted in ascending order and
/// truncated to the lowest `k` pairs
pub fn diagonalize_dense(mat: Dmat, k: usize) -> Spectrum {
    let SymmetricEigen {
        eigenvectors: vecs,
        eigenvalues: vals,
    } = SymmetricEigen::new(mat);
    let mut pairs: Vec<_> = vals.iter().enumerate().collect();
    pairs.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let k = k.min(pairs.len());
    let rows = vecs.nrows();
    let mut ret = Dmat::zeros(rows, k);
    for i in 0..k {
        ret.set_column(i, &vecs.column(pairs[i].0));
    }
    Spectrum {
        energies: Dvec::from_iterator(k, pairs.iter().take(k).map(|a| *a.1)),
        vectors: ret,
    }
}

/// the lowest `k` eigenpairs of `h`, converting to a dense matrix when its
/// dimension is at most `dense_limit`
pub fn diagonalize_sparse(
    h: &SparseHamiltonian,
    k: usize,
    dense_limit: usize,
) -> Spectrum {
    if h.dim() <= dense_limit {
        diagonalize_dense(h.to_dense(), k)
    } else {
        lanczos(h, k)
    }
}

/// a deterministic pseudo-random unit vector from the fractional parts of
/// multiples of the golden ratio
fn start_vector(n: usize, offset: usize) -> Dvec {
    const PHI: f64 = 0.618_033_988_749_894_9;
    let v = Dvec::from_fn(n, |i, _| {
        let x = ((i + offset + 1) as f64 * PHI).fract();
        x - 0.5
    });
    v.normalize()
}

/// remove the components of `w` along each of `basis`, twice
fn orthogonalize(w: &mut Dvec, basis: &[Dvec]) {
    for _ in 0..2 {
        for v in basis {
            let d = w.dot(v);
            w.axpy(-d, v, 1.0);
        }
    }
}

/// Lanczos iteration with full reorthogonalization for the `k` algebraically
/// smallest eigenpairs of `h`, restarting from the sum of the wanted Ritz
/// vectors until their residuals converge
pub fn lanczos(h: &SparseHamiltonian, k: usize) -> Spectrum {
    let n = h.dim();
    let k = k.min(n);
    if k == 0 {
        return Spectrum {
            energies: Dvec::zeros(0),
            vectors: Dmat::zeros(n, 0),
        };
    }
    let m = n.min((30 * k).max(300));
    let mut q = start_vector(n, 0);
    let mut fresh = 1;
    let mut best = None;
    for restart in 0..LANCZOS_RESTARTS {
        let mut vs: Vec<Dvec> = Vec::with_capacity(m);
        let mut alpha = Vec::with_capacity(m);
        let mut beta: Vec<f64> = Vec::with_capacity(m);
        let mut last_beta = 0.0;
        vs.push(q.clone());
        for j in 0..m {
            let mut w = h.matvec(&vs[j]);
            let a = vs[j].dot(&w);
            alpha.push(a);
            w.axpy(-a, &vs[j], 1.0);
            if j > 0 {
                w.axpy(-beta[j - 1], &vs[j - 1], 1.0);
            }
            orthogonalize(&mut w, &vs);
            let b = w.norm();
            last_beta = b;
            if j + 1 == m {
                break;
            }
            if b > 1e-10 {
                beta.push(b);
                vs.push(w / b);
            } else {
                // invariant subspace found, continue from a fresh direction
                let mut r = start_vector(n, fresh * n);
                fresh += 1;
                orthogonalize(&mut r, &vs);
                let rn = r.norm();
                if rn < 1e-10 {
                    last_beta = 0.0;
                    break;
                }
                beta.push(0.0);
                vs.push(r / rn);
            }
        }
        let dim = alpha.len();
        let t = Dmat::from_fn(dim, dim, |i, j| {
            if i == j {
                alpha[i]
            } else if i == j + 1 {
                beta[j]
            } else if j == i + 1 {
                beta[i]
            } else {
                0.0
            }
        });
        let ritz = diagonalize_dense(t, k);
        let kk = ritz.len();
        let residuals: Vec<f64> = (0..kk)
            .map(|i| last_beta * ritz.vectors[(dim - 1, i)].abs())
            .collect();
        let mut vectors = Dmat::zeros(n, kk);
        for i in 0..kk {
            let mut y = Dvec::zeros(n);
            for (l, v) in vs.iter().take(dim).enumerate() {
                y.axpy(ritz.vectors[(l, i)], v, 1.0);
            }
            vectors.set_column(i, &y);
        }
        let converged = residuals
            .iter()
            .zip(ritz.energies.iter())
            .all(|(r, e)| *r <= LANCZOS_TOL * e.abs().max(1.0));
        debug!(
            "lanczos restart {restart}: subspace {dim}, max residual {:.3e}",
            residuals.iter().fold(0.0, |a: f64, b| a.max(*b))
        );
        let spectrum = Spectrum {
            energies: ritz.energies,
            vectors,
        };
        if converged && kk == k {
            return spectrum;
        }
        let mut next = Dvec::zeros(n);
        for col in spectrum.vectors.column_iter() {
            next += col;
        }
        best = Some(spectrum);
        let norm = next.norm();
        if norm < 1e-12 {
            break;
        }
        q = next / norm;
    }
    warn!("lanczos failed to converge {k} eigenpairs of a {n}x{n} matrix");
    best.unwrap_or_else(|| Spectrum {
        energies: Dvec::zeros(0),
        vectors: Dmat::zeros(n, 0),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        basis::Basis,
        fc::{ForceConstant, Potential},
        hamiltonian::{build_dense, build_sparse},
        modal::Modals,
    };

    use super::*;

    fn model() -> (Dmat, SparseHamiltonian) {
        let pot = Potential::new(
            4,
            vec![
                ForceConstant::new(0.2, vec![0, 1, 1]),
                ForceConstant::new(-0.15, vec![0, 2, 3]),
                ForceConstant::new(0.05, vec![1, 1, 3, 3]),
                ForceConstant::new(0.02, vec![0, 0, 0, 0]),
            ],
        )
        .unwrap();
        let modals = Modals::Harmonic(vec![1.0, 1.3, 1.7, 2.2]);
        let basis = Basis::truncated(&[6, 6, 6, 6], 4);
        (
            build_dense(&basis, &pot, &modals),
            SparseHamiltonian::new(build_sparse(&basis, &pot, &modals)),
        )
    }

    #[test]
    fn dense_sorted() {
        #[rustfmt::skip]
        let mat = Dmat::from_row_slice(3, 3, &[
            2.0, 1.0, 0.0,
            1.0, 2.0, 0.0,
            0.0, 0.0, 5.0,
        ]);
        let got = diagonalize_dense(mat.clone(), 2);
        assert_eq!(got.len(), 2);
        assert_abs_diff_eq!(got.energies[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(got.energies[1], 3.0, epsilon = 1e-12);
        for i in 0..2 {
            let v = got.vectors.column(i);
            assert_abs_diff_eq!(
                &mat * v,
                v * got.energies[i],
                epsilon = 1e-12
            );
        }
        // asking for more than the dimension gives all of them
        assert_eq!(diagonalize_dense(mat, 10).len(), 3);
    }

    #[test]
    fn lanczos_matches_dense() {
        let (dense, sparse) = model();
        assert!(sparse.dim() > 60);
        let want = diagonalize_dense(dense.clone(), 4);
        let got = lanczos(&sparse, 4);
        assert_abs_diff_eq!(got.energies, want.energies, epsilon = 1e-8);
        for i in 0..4 {
            let v = got.vectors.column(i);
            assert_abs_diff_eq!(v.norm(), 1.0, epsilon = 1e-8);
            assert_abs_diff_eq!(
                &dense * v,
                v * got.energies[i],
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn sparse_dense_limit() {
        let (dense, sparse) = model();
        let want = diagonalize_dense(dense, 3);
        let got = diagonalize_sparse(&sparse, 3, sparse.dim());
        assert_eq!(got, want);
        let got = diagonalize_sparse(&sparse, 3, 0);
        assert_abs_diff_eq!(got.energies, want.energies, epsilon = 1e-8);
    }
}
