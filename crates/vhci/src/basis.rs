use std::{fmt::Display, ops::Index, str::FromStr};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::VhciError;

/// a product of one-mode functions, stored as the number of quanta in each
/// mode
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BasisState(pub Vec<usize>);

impl BasisState {
    pub fn ground(nmodes: usize) -> Self {
        Self(vec![0; nmodes])
    }

    pub fn quanta(&self) -> &[usize] {
        &self.0
    }

    pub fn nmodes(&self) -> usize {
        self.0.len()
    }

    /// total number of quanta across all modes
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// a label like `w1 + 2w3` built from 1-based mode numbers. the ground
    /// state is labeled `0`
    pub fn label(&self) -> String {
        let parts: Vec<_> = self
            .0
            .iter()
            .enumerate()
            .filter(|(_, q)| **q > 0)
            .map(|(j, q)| match *q {
                1 => format!("w{}", j + 1),
                _ => format!("{q}w{}", j + 1),
            })
            .collect();
        if parts.is_empty() {
            String::from("0")
        } else {
            parts.join(" + ")
        }
    }
}

impl Display for BasisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "|")?;
        for (i, q) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{q}")?;
        }
        write!(f, ">")
    }
}

impl FromStr for BasisState {
    type Err = VhciError;

    /// parse a whitespace-separated line of quanta
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(|q| {
                q.parse::<usize>().map_err(|e| {
                    VhciError::ParseError(format!(
                        "failed to parse basis state from `{s}` with {e}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// an ordered set of [BasisState]s. the position of a state is its row and
/// column in the Hamiltonian and its row in the eigenvectors, so states are
/// only ever appended
#[derive(Clone, Debug, Default)]
pub struct Basis {
    nmodes: usize,
    states: Vec<BasisState>,
    index: FxHashMap<BasisState, usize>,
    highest_quanta: Vec<usize>,
}

impl PartialEq for Basis {
    fn eq(&self, other: &Self) -> bool {
        self.nmodes == other.nmodes && self.states == other.states
    }
}

impl Index<usize> for Basis {
    type Output = BasisState;

    fn index(&self, index: usize) -> &Self::Output {
        &self.states[index]
    }
}

impl Basis {
    pub fn new(nmodes: usize) -> Self {
        Self {
            nmodes,
            states: Vec::new(),
            index: FxHashMap::default(),
            highest_quanta: vec![0; nmodes],
        }
    }

    /// build a basis from `states`, dropping any repeats after their first
    /// occurrence
    pub fn from_states(nmodes: usize, states: Vec<BasisState>) -> Self {
        let mut ret = Self::new(nmodes);
        ret.extend(states);
        ret
    }

    /// enumerate the truncated product basis: starting from the ground state,
    /// add one quantum at a time to every mode, keeping states with fewer than
    /// `max_quanta[i]` quanta in mode `i` and at most `max_total` quanta in
    /// total
    pub fn truncated(max_quanta: &[usize], max_total: usize) -> Self {
        let nmodes = max_quanta.len();
        let mut ret = Self::new(nmodes);
        let ground = BasisState::ground(nmodes);
        let mut frontier = vec![ground.clone()];
        ret.push(ground);
        for _ in 0..max_total {
            let mut next = Vec::new();
            let mut seen = FxHashSet::default();
            for b in &frontier {
                for i in 0..nmodes {
                    let mut new = b.clone();
                    new.0[i] += 1;
                    if new.0[i] < max_quanta[i]
                        && !ret.contains(&new)
                        && seen.insert(new.clone())
                    {
                        next.push(new);
                    }
                }
            }
            ret.extend(next.clone());
            frontier = next;
        }
        ret
    }

    fn push(&mut self, state: BasisState) -> bool {
        if self.index.contains_key(&state) {
            return false;
        }
        self.index.insert(state.clone(), self.states.len());
        self.states.push(state);
        true
    }

    /// append `states` to the end of the basis and fold them into the highest
    /// quanta. returns the number of states actually added
    pub fn extend(&mut self, states: Vec<BasisState>) -> usize {
        self.update_highest_quanta(&states);
        let mut added = 0;
        for s in states {
            if self.push(s) {
                added += 1;
            }
        }
        added
    }

    /// raise the per-mode highest quanta to cover `states`
    pub fn update_highest_quanta(&mut self, states: &[BasisState]) {
        for s in states {
            for (h, q) in self.highest_quanta.iter_mut().zip(&s.0) {
                *h = (*h).max(*q);
            }
        }
    }

    /// the largest number of quanta seen in each mode
    pub fn highest_quanta(&self) -> &[usize] {
        &self.highest_quanta
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn nmodes(&self) -> usize {
        self.nmodes
    }

    pub fn states(&self) -> &[BasisState] {
        &self.states
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BasisState> {
        self.states.iter()
    }

    pub fn contains(&self, state: &BasisState) -> bool {
        self.index.contains_key(state)
    }

    pub fn index_of(&self, state: &BasisState) -> Option<usize> {
        self.index.get(state).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated() {
        let got = Basis::truncated(&[3, 3], 2);
        let want: Vec<_> = [[0, 0], [1, 0], [0, 1], [2, 0], [1, 1], [0, 2]]
            .into_iter()
            .map(|s| BasisState(s.to_vec()))
            .collect();
        assert_eq!(got.states(), want);
        assert_eq!(got.highest_quanta(), &[2, 2]);
    }

    #[test]
    fn truncated_by_mode() {
        // only one quantum allowed in the second mode
        let got = Basis::truncated(&[4, 2, 3], 3);
        for s in got.iter() {
            assert!(s.0[0] < 4 && s.0[1] < 2 && s.0[2] < 3);
            assert!(s.total() <= 3);
        }
        assert_eq!(got.highest_quanta(), &[3, 1, 2]);
        // 1 + 3 + 5 + 6
        assert_eq!(got.len(), 15);
    }

    #[test]
    fn extend() {
        let mut basis = Basis::truncated(&[2, 2], 1);
        let before = basis.states().to_vec();
        let added = basis.extend(vec![
            BasisState(vec![1, 0]),
            BasisState(vec![3, 1]),
            BasisState(vec![3, 1]),
        ]);
        assert_eq!(added, 1);
        assert_eq!(&basis.states()[..before.len()], before);
        assert_eq!(basis.index_of(&BasisState(vec![3, 1])), Some(3));
        assert_eq!(basis.highest_quanta(), &[3, 1]);
    }

    #[test]
    fn labels() {
        assert_eq!(BasisState(vec![0, 0, 0]).label(), "0");
        assert_eq!(BasisState(vec![1, 0, 2]).label(), "w1 + 2w3");
        assert_eq!(BasisState(vec![0, 1, 2]).to_string(), "|0,1,2>");
    }

    #[test]
    fn parse() {
        let got: BasisState = "0 2 1".parse().unwrap();
        assert_eq!(got, BasisState(vec![0, 2, 1]));
        assert!("0 x 1".parse::<BasisState>().is_err());
    }
}
