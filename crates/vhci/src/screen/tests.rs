use approx::assert_abs_diff_eq;
use test_case::test_case;

use crate::fc::ForceConstant;

use super::*;

fn model() -> (Basis, Potential, Modals, Vec<f64>) {
    let pot = Potential::new(
        3,
        vec![
            ForceConstant::scaled(0.08, vec![0, 1, 1]),
            ForceConstant::scaled(-0.05, vec![0, 0, 2]),
            ForceConstant::scaled(0.02, vec![0, 1, 2]),
            ForceConstant::scaled(0.01, vec![1, 1, 2, 2]),
            ForceConstant::scaled(0.004, vec![0, 0, 0, 0]),
        ],
    )
    .unwrap();
    let modals = Modals::Harmonic(vec![1.0, 1.4, 2.1]);
    let basis = Basis::truncated(&[4, 4, 4], 1);
    let coeffs = vec![0.95, -0.2, 0.15, 0.1];
    (basis, pot, modals, coeffs)
}

fn basis_of(states: &[BasisState]) -> Basis {
    Basis::from_states(states[0].nmodes(), states.to_vec())
}

#[test_case(HbMethod::Orig)]
#[test_case(HbMethod::Max)]
#[test_case(HbMethod::Exact)]
#[test_case(HbMethod::Coupling)]
fn threshold_monotonicity(method: HbMethod) {
    let (basis, pot, modals, coeffs) = model();
    let policy = method.policy(&[4, 4, 4]);
    let mut prev: Option<FxHashSet<BasisState>> = None;
    for eps in [1e-4, 1e-3, 1e-2, 5e-2] {
        let got = policy.screen(&basis, &pot, &modals, &coeffs, eps);
        let set: FxHashSet<_> = got.states.iter().cloned().collect();
        assert_eq!(set.len(), got.len(), "duplicate states at {eps}");
        for s in &got.states {
            assert!(!basis.contains(s));
        }
        if let Some(prev) = prev {
            assert!(set.is_subset(&prev), "not monotonic at {eps}");
        }
        prev = Some(set);
    }
}

#[test]
fn exact_and_coupling_agree() {
    let (basis, pot, modals, coeffs) = model();
    for eps in [1e-4, 1e-3, 1e-2] {
        let exact = ExactScreen.screen(&basis, &pot, &modals, &coeffs, eps);
        let coup = CouplingScreen.screen(&basis, &pot, &modals, &coeffs, eps);
        assert!(!exact.is_empty());
        assert_eq!(exact.states, coup.states);
        assert_eq!(exact.couplings.len(), exact.len());
        assert_eq!(coup.couplings.len(), coup.len());
        for c in &exact.couplings {
            assert!(*c > eps);
        }
    }
}

#[test]
fn max_respects_max_quanta() {
    let (basis, pot, modals, coeffs) = model();
    let max_quanta = [3, 2, 2];
    let got = MaxScreen {
        max_quanta: max_quanta.to_vec(),
    }
    .screen(&basis, &pot, &modals, &coeffs, 1e-4);
    assert!(!got.is_empty());
    let mut want = vec![0; 3];
    for s in &got.states {
        for (i, q) in s.0.iter().enumerate() {
            assert!(*q < max_quanta[i]);
            want[i] = want[i].max(*q);
        }
    }
    assert_eq!(got.highest_quanta, want);

    // without the limit, orig finds states beyond it
    let orig = OrigScreen.screen(&basis, &pot, &modals, &coeffs, 1e-4);
    assert!(orig.len() > got.len());
}

#[test]
fn orig_estimates() {
    let pot =
        Potential::new(3, vec![ForceConstant::scaled(0.1, vec![0, 1, 1])])
            .unwrap();
    let modals = Modals::Harmonic(vec![1.0, 1.0, 1.0]);
    let basis = basis_of(&[BasisState(vec![0, 0, 0])]);

    // the derived single for mode 0 has coefficient 0.2 and is screened
    // first, then W011 reaches |1,2,0> with estimate 0.1√2
    let got = OrigScreen.screen(&basis, &pot, &modals, &[1.0], 0.05);
    assert_eq!(
        got.states,
        vec![BasisState(vec![1, 0, 0]), BasisState(vec![1, 2, 0])]
    );
    assert!(got.couplings.is_empty());

    let got = OrigScreen.screen(&basis, &pot, &modals, &[1.0], 0.15);
    assert_eq!(got.states, vec![BasisState(vec![1, 0, 0])]);

    let got = OrigScreen.screen(&basis, &pot, &modals, &[0.1], 0.15);
    assert!(got.is_empty());
}

#[test]
fn coupling_values() {
    let pot =
        Potential::new(3, vec![ForceConstant::scaled(0.1, vec![0, 1, 1])])
            .unwrap();
    let modals = Modals::Harmonic(vec![1.0, 1.0, 1.0]);
    let basis = basis_of(&[BasisState(vec![0, 0, 0])]);
    let got = CouplingScreen.screen(&basis, &pot, &modals, &[-0.5], 0.01);
    assert_eq!(
        got.states,
        vec![BasisState(vec![1, 0, 0]), BasisState(vec![1, 2, 0])]
    );
    assert_abs_diff_eq!(got.couplings[0], -0.05, epsilon = 1e-14);
    assert_abs_diff_eq!(
        got.couplings[1],
        -0.05 * 2f64.sqrt(),
        epsilon = 1e-14
    );

    let got = ExactScreen.screen(&basis, &pot, &modals, &[-0.5], 0.06);
    assert_eq!(got.states, vec![BasisState(vec![1, 2, 0])]);
    assert_abs_diff_eq!(got.couplings[0], 0.05 * 2f64.sqrt(), epsilon = 1e-14);
}

#[test]
fn method_names() {
    assert_eq!("orig".parse::<HbMethod>().unwrap(), HbMethod::Orig);
    assert_eq!("MAX".parse::<HbMethod>().unwrap(), HbMethod::Max);
    assert_eq!("coupling".parse::<HbMethod>().unwrap(), HbMethod::Coupling);
    assert!("bogus".parse::<HbMethod>().unwrap_err().is_config());
    assert_eq!(HbMethod::Exact.to_string(), "exact");
}
