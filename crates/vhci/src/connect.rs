//! applying the Hamiltonian to a single basis state

use rustc_hash::FxHashMap;

use crate::{
    basis::BasisState,
    fc::{ForceConstant, Potential},
    modal::Modals,
};

/// the nonzero elements `<n|H|m>` for one ket `|m>`, in the order the bras were
/// first reached
#[derive(Clone, Debug, Default)]
pub struct Connections {
    index: FxHashMap<BasisState, usize>,
    entries: Vec<(BasisState, f64)>,
}

impl Connections {
    fn add(&mut self, state: BasisState, value: f64) {
        if let Some(i) = self.index.get(&state) {
            self.entries[*i].1 += value;
        } else {
            self.index.insert(state.clone(), self.entries.len());
            self.entries.push((state, value));
        }
    }

    pub fn get(&self, state: &BasisState) -> Option<f64> {
        self.index.get(state).map(|i| self.entries[*i].1)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (BasisState, f64)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Connections {
    type Item = (BasisState, f64);

    type IntoIter = std::vec::IntoIter<(BasisState, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// call `f` with every state reachable from `state` by changing the quanta on
/// the modes of `fc` to one of `targets` for that mode, along with the product
/// of `factor` over the modes
pub(crate) fn excitations<T, F>(
    state: &BasisState,
    fc: &ForceConstant,
    targets: T,
    factor: F,
    mut f: impl FnMut(BasisState, f64),
) where
    T: Fn(usize, usize, usize) -> Vec<usize>,
    F: Fn(usize, usize, usize, usize) -> f64,
{
    let lists: Vec<_> = fc
        .unique
        .iter()
        .zip(&fc.powers)
        .map(|(i, p)| targets(*i, state.0[*i], *p))
        .collect();
    if lists.iter().any(Vec::is_empty) {
        return;
    }
    let mut pos = vec![0; lists.len()];
    let mut new = state.clone();
    loop {
        let mut prod = 1.0;
        for (k, (i, p)) in fc.unique.iter().zip(&fc.powers).enumerate() {
            let n = lists[k][pos[k]];
            new.0[*i] = n;
            prod *= factor(*i, n, state.0[*i], *p);
        }
        f(new.clone(), prod);

        // advance the last mode fastest
        let mut k = lists.len();
        loop {
            if k == 0 {
                return;
            }
            k -= 1;
            pos[k] += 1;
            if pos[k] < lists[k].len() {
                break;
            }
            pos[k] = 0;
        }
    }
}

/// sum of the one-mode operators on the diagonal of `state`
fn one_mode_diagonal(state: &BasisState, modals: &Modals) -> f64 {
    state
        .0
        .iter()
        .enumerate()
        .map(|(i, m)| modals.one_mode(i, *m, *m))
        .sum()
}

/// every nonzero `<n|H|state>`. the one-mode terms come first, followed by
/// each force constant in the order of [Potential::list]
pub fn connections(
    state: &BasisState,
    potential: &Potential,
    modals: &Modals,
) -> Connections {
    let mut ret = Connections::default();
    ret.add(state.clone(), one_mode_diagonal(state, modals));
    for (i, m) in state.0.iter().enumerate() {
        for n in modals.one_mode_targets(i, *m) {
            let v = modals.one_mode(i, n, *m);
            if v != 0.0 {
                let mut new = state.clone();
                new.0[i] = n;
                ret.add(new, v);
            }
        }
    }
    for fc in potential.list() {
        excitations(
            state,
            fc,
            |i, m, p| modals.targets(i, m, p),
            |i, n, m, p| modals.element(i, n, m, p),
            |new, prod| {
                let v = fc.coefficient * prod;
                if v != 0.0 {
                    ret.add(new, v);
                }
            },
        );
    }
    ret
}

/// `<state|H|state>`, accumulated in the same order as [connections]
pub fn diagonal(
    state: &BasisState,
    potential: &Potential,
    modals: &Modals,
) -> f64 {
    let mut ret = one_mode_diagonal(state, modals);
    for fc in potential.list() {
        let mut prod = 1.0;
        for (i, p) in fc.unique.iter().zip(&fc.powers) {
            let m = state.0[*i];
            prod *= modals.element(*i, m, m, *p);
        }
        let v = fc.coefficient * prod;
        if v != 0.0 {
            ret += v;
        }
    }
    ret
}

/// an upper bound on `|<n|H|state>|` for every `n` other than `state`
pub fn coupling_bound(
    state: &BasisState,
    potential: &Potential,
    modals: &Modals,
) -> f64 {
    let one: f64 = state
        .0
        .iter()
        .enumerate()
        .map(|(i, m)| modals.one_mode_bound(i, *m))
        .sum();
    let terms: f64 = potential
        .list()
        .map(|fc| {
            fc.unique
                .iter()
                .zip(&fc.powers)
                .map(|(i, p)| modals.norm_bound(*i, state.0[*i], *p))
                .product::<f64>()
                * fc.coefficient.abs()
        })
        .sum();
    one + terms
}
