//! one-mode integrals over harmonic oscillator functions or VSCF modals

use crate::{Dmat, error::VhciError, fc::MAX_ORDER};

/// highest power of `(a + a†)` tabulated for VSCF modals
pub const MAX_POWER: usize = MAX_ORDER;

/// `<n|(a + a†)^p|m>` for harmonic oscillator functions. the arguments are put
/// in canonical order before evaluation so that swapping `n` and `m` gives
/// exactly the same value
pub fn ladder(n: usize, m: usize, p: usize) -> f64 {
    let (lo, hi) = if n <= m { (n, m) } else { (m, n) };
    let diff = hi - lo;
    if diff > p || (p - diff) % 2 != 0 {
        return 0.0;
    }
    // amplitudes of (a + a†)^k |lo> for each quantum number
    let mut v = vec![0.0; lo + p + 1];
    v[lo] = 1.0;
    for _ in 0..p {
        let mut w = vec![0.0; v.len()];
        for (k, x) in v.iter().enumerate() {
            let x = *x;
            if x == 0.0 {
                continue;
            }
            if k > 0 {
                w[k - 1] += (k as f64).sqrt() * x;
            }
            if k + 1 < w.len() {
                w[k + 1] += ((k + 1) as f64).sqrt() * x;
            }
        }
        v = w;
    }
    v[hi]
}

/// the single-path ladder factor `sqrt(max(n,m)! / min(n,m)!)` used for
/// estimating heat-bath couplings
pub fn ladder_estimate(n: usize, m: usize) -> f64 {
    let (lo, hi) = if n <= m { (n, m) } else { (m, n) };
    ((lo + 1)..=hi).map(|k| (k as f64).sqrt()).product()
}

/// upper bound on [ladder_estimate] over every `n` reachable from `m` with
/// `p` ladder operators: `sqrt((m+p)! / m!)`
pub fn ladder_estimate_bound(m: usize, p: usize) -> f64 {
    (1..=p).map(|s| ((m + s) as f64).sqrt()).product()
}

/// upper bound on `|<n|(a + a†)^p|m>|` over every `n`
pub fn ladder_norm_bound(m: usize, p: usize) -> f64 {
    (0..p)
        .map(|s| ((m + s) as f64).sqrt() + ((m + s + 1) as f64).sqrt())
        .product()
}

/// the harmonic oscillator matrix of `(a + a†)^p` in the first `size`
/// functions
pub fn ladder_matrix(size: usize, p: usize) -> Dmat {
    Dmat::from_fn(size, size, |k, l| ladder(k, l, p))
}

/// a symmetric matrix whose two triangles are exactly equal
fn symmetrize(m: Dmat) -> Dmat {
    let t = m.transpose();
    (m + t) * 0.5
}

/// integrals over VSCF modals. mode `i` carries a `max_quanta[i]` square
/// coefficient matrix whose columns expand the modals in harmonic oscillator
/// functions
#[derive(Clone, Debug, PartialEq)]
pub struct VscfModals {
    pub frequencies: Vec<f64>,
    pub max_quanta: Vec<usize>,
    pub cs: Vec<Dmat>,

    /// the harmonic part of the one-mode operator in the modal basis
    h: Vec<Dmat>,

    /// `Cᵀ (a + a†)^p C` for each mode and each p up to [MAX_POWER]
    ys: Vec<Vec<Dmat>>,

    /// largest magnitude in each column of each `ys` matrix
    ymax: Vec<Vec<Vec<f64>>>,

    /// largest off-diagonal magnitude in each column of `h`
    hmax: Vec<Vec<f64>>,
}

impl VscfModals {
    pub fn new(
        frequencies: Vec<f64>,
        cs: Vec<Dmat>,
    ) -> Result<Self, VhciError> {
        if frequencies.len() != cs.len() {
            return Err(VhciError::Config(format!(
                "{} modal coefficient matrices given for {} modes",
                cs.len(),
                frequencies.len()
            )));
        }
        let mut max_quanta = Vec::with_capacity(cs.len());
        let mut h = Vec::with_capacity(cs.len());
        let mut ys = Vec::with_capacity(cs.len());
        let mut ymax = Vec::with_capacity(cs.len());
        let mut hmax = Vec::with_capacity(cs.len());
        for (i, (c, w)) in cs.iter().zip(&frequencies).enumerate() {
            let (r, k) = c.shape();
            if r != k || r == 0 {
                return Err(VhciError::Config(format!(
                    "modal coefficients for mode {i} must be square, got \
                     {r}x{k}"
                )));
            }
            max_quanta.push(r);
            let harm = Dmat::from_fn(r, r, |a, b| {
                if a == b { w * (a as f64 + 0.5) } else { 0.0 }
            });
            let hi = symmetrize(c.transpose() * harm * c);
            hmax.push(
                (0..r)
                    .map(|m| {
                        (0..r)
                            .filter(|n| *n != m)
                            .map(|n| hi[(n, m)].abs())
                            .fold(0.0, f64::max)
                    })
                    .collect(),
            );
            h.push(hi);
            let yi: Vec<_> = (0..=MAX_POWER)
                .map(|p| {
                    symmetrize(c.transpose() * ladder_matrix(r, p) * c)
                })
                .collect();
            ymax.push(
                yi.iter()
                    .map(|y| {
                        y.column_iter()
                            .map(|col| col.amax())
                            .collect()
                    })
                    .collect(),
            );
            ys.push(yi);
        }
        Ok(Self {
            frequencies,
            max_quanta,
            cs,
            h,
            ys,
            ymax,
            hmax,
        })
    }

    /// `<n|(a + a†)^p|m>` over modals of mode `i`
    pub fn y(&self, i: usize, n: usize, m: usize, p: usize) -> f64 {
        self.ys[i][p][(n, m)]
    }

    /// `<n|h|m>` over modals of mode `i`
    pub fn h(&self, i: usize, n: usize, m: usize) -> f64 {
        self.h[i][(n, m)]
    }
}

/// the one-mode functions the Hamiltonian is expressed in
#[derive(Clone, Debug, PartialEq)]
pub enum Modals {
    /// harmonic oscillator functions with these frequencies
    Harmonic(Vec<f64>),

    Vscf(VscfModals),
}

impl Modals {
    pub fn nmodes(&self) -> usize {
        self.frequencies().len()
    }

    pub fn frequencies(&self) -> &[f64] {
        match self {
            Modals::Harmonic(w) => w,
            Modals::Vscf(v) => &v.frequencies,
        }
    }

    /// the modal basis size for each mode, if it is bounded
    pub fn max_quanta(&self) -> Option<&[usize]> {
        match self {
            Modals::Harmonic(_) => None,
            Modals::Vscf(v) => Some(&v.max_quanta),
        }
    }

    /// `<n|h_i|m>` for the harmonic one-mode operator of mode `i`
    pub fn one_mode(&self, i: usize, n: usize, m: usize) -> f64 {
        match self {
            Modals::Harmonic(w) => {
                if n == m {
                    w[i] * (m as f64 + 0.5)
                } else {
                    0.0
                }
            }
            Modals::Vscf(v) => v.h(i, n, m),
        }
    }

    /// functions of mode `i` other than `m` coupled to `m` by the one-mode
    /// operator
    pub fn one_mode_targets(&self, i: usize, m: usize) -> Vec<usize> {
        match self {
            Modals::Harmonic(_) => Vec::new(),
            Modals::Vscf(v) => {
                (0..v.max_quanta[i]).filter(|n| *n != m).collect()
            }
        }
    }

    /// largest off-diagonal one-mode element in column `m` of mode `i`
    pub fn one_mode_bound(&self, i: usize, m: usize) -> f64 {
        match self {
            Modals::Harmonic(_) => 0.0,
            Modals::Vscf(v) => v.hmax[i][m],
        }
    }

    /// `<n|(a + a†)^p|m>` in mode `i`
    pub fn element(&self, i: usize, n: usize, m: usize, p: usize) -> f64 {
        match self {
            Modals::Harmonic(_) => ladder(n, m, p),
            Modals::Vscf(v) => v.y(i, n, m, p),
        }
    }

    /// the functions of mode `i` that `(a + a†)^p` can connect to `m`
    pub fn targets(&self, i: usize, m: usize, p: usize) -> Vec<usize> {
        match self {
            Modals::Harmonic(_) => {
                let lo = m as isize - p as isize;
                (0..=p)
                    .map(|s| lo + 2 * s as isize)
                    .filter(|n| *n >= 0)
                    .map(|n| n as usize)
                    .collect()
            }
            Modals::Vscf(v) => (0..v.max_quanta[i]).collect(),
        }
    }

    /// heat-bath estimate of the mode-`i` factor coupling `n` and `m`
    pub fn estimate(&self, i: usize, n: usize, m: usize, p: usize) -> f64 {
        match self {
            Modals::Harmonic(_) => ladder_estimate(n, m),
            Modals::Vscf(v) => v.y(i, n, m, p).abs(),
        }
    }

    /// upper bound on [Modals::estimate] over every target of `m`
    pub fn estimate_bound(&self, i: usize, m: usize, p: usize) -> f64 {
        match self {
            Modals::Harmonic(_) => ladder_estimate_bound(m, p),
            Modals::Vscf(v) => v.ymax[i][p][m],
        }
    }

    /// upper bound on `|<n|(a + a†)^p|m>|` over every `n`
    pub fn norm_bound(&self, i: usize, m: usize, p: usize) -> f64 {
        match self {
            Modals::Harmonic(_) => ladder_norm_bound(m, p),
            Modals::Vscf(v) => v.ymax[i][p][m],
        }
    }
}
