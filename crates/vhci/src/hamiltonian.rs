//! dense, sparse, and incremental construction of the Hamiltonian matrix

use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

use crate::{
    Dmat, Dvec, basis::Basis, connect::connections, fc::Potential,
    modal::Modals,
};


/// the upper-triangle elements of row `row`, only including columns in
/// `cols`. every element is computed from the lower-index state of its pair
fn upper_row(
    basis: &Basis,
    row: usize,
    cols: std::ops::Range<usize>,
    potential: &Potential,
    modals: &Modals,
) -> Vec<(usize, f64)> {
    let mut ret: Vec<_> = connections(&basis[row], potential, modals)
        .into_iter()
        .filter_map(|(n, v)| {
            basis
                .index_of(&n)
                .filter(|j| *j >= row && cols.contains(j))
                .map(|j| (j, v))
        })
        .collect();
    ret.sort_by_key(|(j, _)| *j);
    ret
}

/// every `(row, col, value)` in the upper triangle of the Hamiltonian over
/// the states `rows`, with columns limited to `cols`
fn upper_triangle(
    basis: &Basis,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
    potential: &Potential,
    modals: &Modals,
) -> Vec<Vec<(usize, f64)>> {
    rows.into_par_iter()
        .map(|i| upper_row(basis, i, cols.clone(), potential, modals))
        .collect()
}

/// build the full Hamiltonian over `basis` as a dense matrix
pub fn build_dense(
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
) -> Dmat {
    let n = basis.len();
    let mut ret = Dmat::zeros(n, n);
    let rows = upper_triangle(basis, 0..n, 0..n, potential, modals);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row {
            ret[(i, j)] = v;
            ret[(j, i)] = v;
        }
    }
    ret
}

/// build the full Hamiltonian over `basis` as a sparse matrix
pub fn build_sparse(
    basis: &Basis,
    potential: &Potential,
    modals: &Modals,
) -> CsrMatrix<f64> {
    let n = basis.len();
    let mut coo = CooMatrix::new(n, n);
    let rows = upper_triangle(basis, 0..n, 0..n, potential, modals);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row {
            coo.push(i, j, v);
            if i != j {
                coo.push(j, i, v);
            }
        }
    }
    CsrMatrix::from(&coo)
}

/// build the blocks of the Hamiltonian involving the states of `basis` after
/// the first `n_old`: the `n_old x m` coupling block between the old and new
/// states and the `m x m` block of the new states
pub fn build_incremental(
    basis: &Basis,
    n_old: usize,
    potential: &Potential,
    modals: &Modals,
) -> (CooMatrix<f64>, CsrMatrix<f64>) {
    let n = basis.len();
    let m = n - n_old;
    let mut old_new = CooMatrix::new(n_old, m);
    let mut new_new = CooMatrix::new(m, m);
    // the old-new elements come from the new kets. H is real symmetric and
    // each element is summed in the same order from either side
    let rows: Vec<Vec<(usize, f64)>> = (n_old..n)
        .into_par_iter()
        .map(|j| {
            connections(&basis[j], potential, modals)
                .into_iter()
                .filter_map(|(s, v)| {
                    basis.index_of(&s).filter(|i| *i < n_old).map(|i| (i, v))
                })
                .collect()
        })
        .collect();
    for (j, col) in rows.into_iter().enumerate() {
        for (i, v) in col {
            old_new.push(i, j, v);
        }
    }
    let rows = upper_triangle(basis, n_old..n, n_old..n, potential, modals);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row {
            let j = j - n_old;
            new_new.push(i, j, v);
            if i != j {
                new_new.push(j, i, v);
            }
        }
    }
    (old_new, CsrMatrix::from(&new_new))
}

/// the Hamiltonian kept across iterations of the variational growth loop
#[derive(Clone, Debug, PartialEq)]
pub struct SparseHamiltonian {
    pub matrix: CsrMatrix<f64>,
}

impl SparseHamiltonian {
    pub fn new(matrix: CsrMatrix<f64>) -> Self {
        Self { matrix }
    }

    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    /// grow `self` into `[[H, old_new], [old_newᵀ, new_new]]`
    pub fn append(
        &mut self,
        old_new: &CooMatrix<f64>,
        new_new: &CsrMatrix<f64>,
    ) {
        let n = self.dim();
        let m = new_new.nrows();
        let mut coo = CooMatrix::new(n + m, n + m);
        for (i, j, v) in self.matrix.triplet_iter() {
            coo.push(i, j, *v);
        }
        for (i, j, v) in old_new.triplet_iter() {
            coo.push(i, n + j, *v);
            coo.push(n + j, i, *v);
        }
        for (i, j, v) in new_new.triplet_iter() {
            coo.push(n + i, n + j, *v);
        }
        self.matrix = CsrMatrix::from(&coo);
    }

    pub fn to_dense(&self) -> Dmat {
        let n = self.dim();
        let mut ret = Dmat::zeros(n, n);
        for (i, j, v) in self.matrix.triplet_iter() {
            ret[(i, j)] += *v;
        }
        ret
    }

    /// `H x`
    pub fn matvec(&self, x: &Dvec) -> Dvec {
        let y: Vec<f64> = (0..self.dim())
            .into_par_iter()
            .map(|i| {
                let row = self.matrix.row(i);
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .map(|(j, v)| v * x[*j])
                    .sum::<f64>()
            })
            .collect();
        Dvec::from_vec(y)
    }
}
