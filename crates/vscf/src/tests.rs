use approx::assert_abs_diff_eq;
use vhci::{
    Basis, Modals, RawFc, Vhci,
    basis::BasisState,
    connect::diagonal,
    hamiltonian::{
        SparseHamiltonian, build_dense, build_incremental, build_sparse,
    },
};

use super::*;

fn raw() -> Vec<RawFc> {
    vec![
        RawFc {
            modes: vec![0, 0, 1],
            value: 0.4,
        },
        RawFc {
            modes: vec![0, 1, 1],
            value: 0.3,
        },
        RawFc {
            modes: vec![0, 0, 0, 0],
            value: 0.2,
        },
    ]
}

fn model(options: VscfOptions) -> Vscf {
    let potential = Potential::from_raw(2, &raw()).unwrap();
    Vscf::new(vec![1.0, 1.7], potential, &[6, 6], options).unwrap()
}

fn tight() -> VscfOptions {
    VscfOptions {
        tol: 1e-12,
        etol: 1e-12,
        ..Default::default()
    }
}

#[test]
fn harmonic() {
    let potential = Potential::from_raw(2, &[]).unwrap();
    let mut vscf = Vscf::new(
        vec![1.0, 1.7],
        potential,
        &[4, 5],
        VscfOptions::default(),
    )
    .unwrap();
    assert_eq!(vscf.scf(), Ok(1));
    assert_abs_diff_eq!(vscf.cs[0], Dmat::identity(4, 4), epsilon = 1e-14);
    assert_abs_diff_eq!(vscf.cs[1], Dmat::identity(5, 5), epsilon = 1e-14);
    assert_abs_diff_eq!(vscf.energy, 1.35, epsilon = 1e-14);
    assert_abs_diff_eq!(
        vscf.es[1],
        Dvec::from_vec(vec![0.85, 2.55, 4.25, 5.95, 7.65]),
        epsilon = 1e-12
    );
}

#[test]
fn variational() {
    let mut vscf = model(tight());
    let start = vscf.energy;
    vscf.scf().unwrap();
    assert!(vscf.energy <= start + 1e-12);

    // no product state is below the full VCI ground state
    let config =
        Config::new(vec![1.0, 1.7], raw(), vec![6, 6], 12).n_states(1);
    let vci = Vhci::new(config, Modals::Harmonic(vec![1.0, 1.7])).unwrap();
    assert!(vci.energies[0] <= vscf.energy);
}

#[test]
fn modal_reference_energy() {
    let mut vscf = model(tight());
    vscf.scf().unwrap();
    let modals = Modals::Vscf(vscf.modals().unwrap());
    let got = diagonal(&BasisState(vec![0, 0]), &vscf.potential, &modals);
    assert_abs_diff_eq!(got, vscf.energy, epsilon = 1e-10);
}

#[test]
fn diis() {
    let mut plain = model(tight());
    plain.scf().unwrap();
    let mut diis = model(VscfOptions {
        diis: true,
        diis_start: 2,
        ..tight()
    });
    diis.scf().unwrap();
    assert_abs_diff_eq!(diis.energy, plain.energy, epsilon = 1e-10);
}

#[test]
fn non_convergence() {
    let mut vscf = model(VscfOptions {
        max_iter: 1,
        ..tight()
    });
    let got = vscf.scf().unwrap_err();
    assert!(matches!(
        got,
        VscfError::NonConvergence { iterations: 1, .. }
    ));
}

#[test]
fn bad_lengths() {
    let potential = Potential::from_raw(2, &raw()).unwrap();
    let got = Vscf::new(
        vec![1.0, 1.7],
        potential,
        &[6],
        VscfOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(got, VscfError::Vhci(VhciError::Config(_))));
}

#[test]
fn fock_error_vanishes() {
    let vscf = model(tight());
    let f = &vscf.focks()[0];
    let Spectrum { vectors, .. } = diagonalize_dense(f.clone(), 6);
    let err = fock_error(f, vectors.column(0));
    assert_abs_diff_eq!(err.norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn vscf_hamiltonian() {
    let mut vscf = model(tight());
    vscf.scf().unwrap();
    let modals = Modals::Vscf(vscf.modals().unwrap());
    let pot = &vscf.potential;

    let mut basis = Basis::truncated(&[6, 6], 2);
    let mut h = SparseHamiltonian::new(build_sparse(&basis, pot, &modals));
    let n_old = basis.len();
    let added = basis.extend(Basis::truncated(&[6, 6], 4).states().to_vec());
    assert!(added > 0);
    let (old_new, new_new) = build_incremental(&basis, n_old, pot, &modals);
    h.append(&old_new, &new_new);

    let full = build_dense(&basis, pot, &modals);
    let got = h.to_dense();
    assert_abs_diff_eq!(got, full, epsilon = 1e-12);
    for i in 0..basis.len() {
        for j in 0..i {
            assert_eq!(full[(i, j)], full[(j, i)]);
            assert_eq!(got[(i, j)], got[(j, i)]);
        }
    }

    // away from the mean field of mode 1, mode 0 still couples
    let a = basis.iter().position(|s| s.0 == [0, 1]).unwrap();
    let b = basis.iter().position(|s| s.0 == [1, 1]).unwrap();
    assert!(full[(a, b)].abs() > 1e-6);
}
