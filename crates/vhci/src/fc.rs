use serde::{Deserialize, Serialize};

use crate::error::VhciError;

/// force constants smaller than this are dropped when the derived single and
/// double heat-bath terms are formed
pub const FC_TOL: f64 = 1e-12;

/// highest expansion order supported in the potential
pub const MAX_ORDER: usize = 6;

/// one term of the potential expansion. the stored `coefficient` already
/// contains the 1/sqrt(2^order) and 1/∏p! factors, so the operator is
/// `coefficient * ∏ₖ (a + a†)^powers[k]` acting on mode `unique[k]`
#[derive(Clone, Debug, PartialEq)]
pub struct ForceConstant {
    pub coefficient: f64,

    /// mode indices as given, with repeats encoding powers
    pub modes: Vec<usize>,

    /// sorted, deduplicated `modes`
    pub unique: Vec<usize>,

    /// number of times each of `unique` appears in `modes`
    pub powers: Vec<usize>,
}

/// raw force constant as it appears in an input file: the derivative value and
/// the modes it is taken with respect to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFc {
    pub modes: Vec<usize>,
    pub value: f64,
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|i| i as f64).product()
}

impl ForceConstant {
    /// build a force constant from the raw derivative `value` with respect to
    /// `modes`, applying the permutation scaling
    pub fn new(value: f64, modes: Vec<usize>) -> Self {
        let mut ret = Self::scaled(value, modes);
        ret.coefficient /= 2f64.powi(ret.order() as i32).sqrt();
        for p in &ret.powers {
            ret.coefficient /= factorial(*p);
        }
        ret
    }

    /// build a force constant whose `coefficient` is already scaled
    pub fn scaled(coefficient: f64, modes: Vec<usize>) -> Self {
        let mut unique = modes.clone();
        unique.sort();
        unique.dedup();
        let powers = unique
            .iter()
            .map(|u| modes.iter().filter(|m| *m == u).count())
            .collect();
        Self {
            coefficient,
            modes,
            unique,
            powers,
        }
    }

    pub fn order(&self) -> usize {
        self.modes.len()
    }

    /// the number of times `mode` appears in `self`
    pub fn count(&self, mode: usize) -> usize {
        self.modes.iter().filter(|m| **m == mode).count()
    }
}

/// the anharmonic part of the potential, split by order, along with the
/// derived terms used for heat-bath screening
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Potential {
    pub nmodes: usize,

    /// cubic, quartic, quintic, and sextic force constants
    pub terms: [Vec<ForceConstant>; 4],

    /// effective single- and double-excitation terms derived from the cubic
    /// and quartic force constants. only used for screening
    pub sd: Vec<ForceConstant>,

    /// `sd` followed by every term in `terms`, sorted by decreasing magnitude
    pub heat_bath: Vec<ForceConstant>,
}

impl Potential {
    /// partition `fcs` by order and form the derived heat-bath terms. every
    /// force constant must have an order between 3 and 6 and refer only to
    /// modes below `nmodes`
    pub fn new(
        nmodes: usize,
        fcs: Vec<ForceConstant>,
    ) -> Result<Self, VhciError> {
        let mut terms: [Vec<ForceConstant>; 4] = Default::default();
        for fc in fcs {
            if !(3..=MAX_ORDER).contains(&fc.order()) {
                return Err(VhciError::Config(format!(
                    "force constant {:?} has unsupported order {}",
                    fc.modes,
                    fc.order()
                )));
            }
            if let Some(m) = fc.modes.iter().find(|m| **m >= nmodes) {
                return Err(VhciError::Config(format!(
                    "force constant {:?} refers to mode {m}, but there are \
                     only {nmodes} modes",
                    fc.modes
                )));
            }
            terms[fc.order() - 3].push(fc);
        }
        let sd = Self::form_sd(nmodes, &terms[0], &terms[1]);
        let mut heat_bath: Vec<_> =
            sd.iter().chain(terms.iter().flatten()).cloned().collect();
        heat_bath.sort_by(|a, b| {
            b.coefficient.abs().total_cmp(&a.coefficient.abs())
        });
        Ok(Self {
            nmodes,
            terms,
            sd,
            heat_bath,
        })
    }

    /// convenience constructor from raw derivatives
    pub fn from_raw(nmodes: usize, raw: &[RawFc]) -> Result<Self, VhciError> {
        Self::new(
            nmodes,
            raw.iter()
                .map(|r| ForceConstant::new(r.value, r.modes.clone()))
                .collect(),
        )
    }

    /// collect the effective single excitations from the cubic force
    /// constants and double excitations from the quartic force constants
    fn form_sd(
        nmodes: usize,
        cubic: &[ForceConstant],
        quartic: &[ForceConstant],
    ) -> Vec<ForceConstant> {
        let mut ret = Vec::new();
        for i in 0..nmodes {
            let mut wi = 0.0;
            // Wiii and Wijj
            for w in cubic {
                match w.count(i) {
                    1 => wi += 2.0 * w.coefficient,
                    3 => wi += 3.0 * w.coefficient,
                    _ => {}
                }
            }
            if wi.abs() > FC_TOL {
                ret.push(ForceConstant::scaled(wi, vec![i]));
            }
        }
        for i in 0..nmodes {
            for j in i..nmodes {
                let mut wij = 0.0;
                // Wiiii, Wiikk, Wijjj, and Wijkk
                for w in quartic {
                    let (ci, cj) = (w.count(i), w.count(j));
                    if ci == 1 && cj == 1 && i != j {
                        wij += 2.0 * w.coefficient;
                    } else if ci == 2 && w.unique.len() == 2 && i == j {
                        wij += 2.0 * w.coefficient;
                    } else if (ci == 1 && cj == 3) || (ci == 3 && cj == 1) {
                        wij += 3.0 * w.coefficient;
                    } else if ci == 4 && i == j {
                        wij += 4.0 * w.coefficient;
                    }
                }
                if wij.abs() > FC_TOL {
                    ret.push(ForceConstant::scaled(wij, vec![i, j]));
                }
            }
        }
        ret
    }

    /// iterate over every force constant in order of increasing expansion
    /// order
    pub fn list(&self) -> impl Iterator<Item = &ForceConstant> {
        self.terms.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.terms.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cubic(&self) -> &[ForceConstant] {
        &self.terms[0]
    }

    pub fn quartic(&self) -> &[ForceConstant] {
        &self.terms[1]
    }

    pub fn quintic(&self) -> &[ForceConstant] {
        &self.terms[2]
    }

    pub fn sextic(&self) -> &[ForceConstant] {
        &self.terms[3]
    }
}
