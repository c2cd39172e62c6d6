use approx::assert_abs_diff_eq;
use nalgebra::SymmetricEigen;
use tempfile::tempdir;

use super::*;
use crate::modal::ladder;

fn cubic() -> Config {
    Config::new(
        vec![1.0, 2.0],
        vec![RawFc {
            modes: vec![0, 0, 0],
            value: 0.1,
        }],
        vec![3, 3],
        2,
    )
    .n_states(3)
}

fn model() -> Config {
    Config::load("testfiles/model.toml").unwrap()
}

#[test]
fn cubic_ground_state() {
    let config = cubic();
    let freqs = config.frequencies.clone();
    let vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();

    // H = Σ w_i (n_i + 1/2) + c x_0³ over the same six states
    let c = 0.1 / 8f64.sqrt() / 6.0;
    let states = [[0, 0], [0, 1], [1, 0], [0, 2], [1, 1], [2, 0]];
    let h = Dmat::from_fn(6, 6, |i, j| {
        let (a, b) = (states[i], states[j]);
        let mut v = 0.0;
        if i == j {
            v += (a[0] as f64 + 0.5) + 2.0 * (a[1] as f64 + 0.5);
        }
        if a[1] == b[1] {
            v += c * ladder(a[0], b[0], 3);
        }
        v
    });
    let want = SymmetricEigen::new(h).eigenvalues.min();
    assert_eq!(vhci.basis.len(), 6);
    assert_abs_diff_eq!(vhci.energies[0], want, epsilon = 1e-8);
    assert_abs_diff_eq!(vhci.energies[0], 1.5, epsilon = 1e-2);
}

#[test]
fn basis_grows_monotonically() {
    let config = model();
    let freqs = config.frequencies.clone();
    let eps = config.eps1;
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    for _ in 0..4 {
        let before = vhci.basis.states().to_vec();
        let added = vhci.hci_step(eps);
        assert_eq!(vhci.basis.len(), before.len() + added);
        assert_eq!(&vhci.basis.states()[..before.len()], &before[..]);
        let mut want = vec![0; vhci.basis.nmodes()];
        for s in vhci.basis.iter() {
            for (w, q) in want.iter_mut().zip(&s.0) {
                *w = (*w).max(*q);
            }
        }
        assert_eq!(vhci.basis.highest_quanta(), &want[..]);
        vhci.sparse_diagonalize();
    }
}

#[test]
fn loose_tolerance() {
    let config = model().tol(1.0);
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    assert_eq!(vhci.hci(&mut std::io::sink()), Ok(1));
    assert_eq!(vhci.iterations, 1);
}

#[test]
fn print_hci_steps() {
    let config = model().print_hci_steps(true);
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    let mut buf = Vec::new();
    let iters = vhci.hci(&mut buf).unwrap();
    let got = String::from_utf8(buf).unwrap();
    assert_eq!(got.lines().count(), iters);
    assert!(got.lines().all(|l| l.starts_with("VHCI iteration")));

    // nothing is written without the option
    let config = model();
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    let mut buf = Vec::new();
    vhci.hci(&mut buf).unwrap();
    assert!(buf.is_empty());
}

#[test]
fn empty_checkpoint() {
    let dir = tempdir().unwrap();
    let chk = dir.path().join("empty.chk");
    std::fs::write(&chk, "\n").unwrap();
    let config = model().chk_file(chk.to_str().unwrap()).read_from_file(true);
    let freqs = config.frequencies.clone();
    let got = Vhci::new(config, Modals::Harmonic(freqs)).unwrap_err();
    assert!(matches!(got, VhciError::ParseError(_)));
}

#[test]
fn non_convergence() {
    let config = model().tol(0.0).max_iter(1).eps1(1e-4).eps2(1e-5);
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    let got = vhci.hci(&mut std::io::sink()).unwrap_err();
    assert!(got.is_non_convergence());
    assert_eq!(
        got,
        VhciError::NonConvergence {
            iterations: 1,
            basis_size: vhci.basis.len(),
        }
    );
}

#[test]
fn persistent_hamiltonian() {
    let config = model();
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    assert!(vhci.hamiltonian().is_none());
    vhci.hci(&mut std::io::sink()).unwrap();
    let got = vhci.hamiltonian().unwrap().to_dense();
    let want = build_dense(&vhci.basis, &vhci.potential, &vhci.modals);
    assert_abs_diff_eq!(got, want, epsilon = 1e-12);

    let sparse = vhci.energies.clone();
    vhci.diagonalize();
    assert!(vhci.hamiltonian().is_none());
    assert_abs_diff_eq!(vhci.energies, sparse, epsilon = 1e-8);
}

#[test]
fn identity_vscf_modals() {
    let config = model();
    let freqs = config.frequencies.clone();
    let cs = config
        .max_quanta
        .iter()
        .map(|q| Dmat::identity(*q, *q))
        .collect();
    let vscf = VscfModals::new(freqs.clone(), cs).unwrap();
    let harm = Vhci::new(config.clone(), Modals::Harmonic(freqs)).unwrap();
    let vscf = Vhci::new(config, Modals::Vscf(vscf)).unwrap();
    let a = build_dense(&harm.basis, &harm.potential, &harm.modals);
    let b = build_dense(&vscf.basis, &vscf.potential, &vscf.modals);
    assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    assert_abs_diff_eq!(harm.energies, vscf.energies, epsilon = 1e-10);
}

#[test]
fn modal_basis_too_small() {
    let config = model();
    let freqs = config.frequencies.clone();
    let cs = vec![Dmat::identity(2, 2), Dmat::identity(2, 2)];
    let vscf = VscfModals::new(freqs, cs).unwrap();
    let got = Vhci::new(config, Modals::Vscf(vscf)).unwrap_err();
    assert!(got.is_config());
}

#[test]
fn pt2_lowers_energies() {
    let config = model().n_states_pt2(2);
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config, Modals::Harmonic(freqs)).unwrap();
    vhci.hci(&mut std::io::sink()).unwrap();
    vhci.pt2(false).unwrap();
    let de = vhci.de_pt2.clone().unwrap();
    assert_eq!(de.len(), 2);
    assert!(de[0] < 0.0);
    assert!(vhci.se_pt2.is_none());
    let out = vhci.output();
    assert_eq!(out.energies.len(), 2);
    assert_eq!(out.energies_pt2.unwrap()[0], vhci.energies[0] + de[0]);
}

#[test]
fn kernel() {
    let dir = tempdir().unwrap();
    let chk = dir.path().join("model.chk");
    let config = model()
        .n_walkers(50)
        .n_samples(20)
        .chk_file(chk.to_str().unwrap())
        .save_to_file(true);
    let freqs = config.frequencies.clone();
    let mut vhci = Vhci::new(config.clone(), Modals::Harmonic(freqs.clone()))
        .unwrap();
    let mut buf = Vec::new();
    let out = vhci
        .kernel(
            &mut buf,
            Kernel {
                do_vhci: true,
                do_pt2: true,
                do_spt2: true,
                compare_pt2: true,
            },
        )
        .unwrap();
    let got = String::from_utf8(buf).unwrap();
    for section in [
        "Configuration Options:",
        "===== VCI RESULTS =====",
        "===== VHCI RESULTS =====",
        "===== VHCI+PT2 RESULTS =====",
        "===== VHCI+SPT2 RESULTS =====",
        "===== PT2 COMPARISON =====",
    ] {
        assert!(got.contains(section), "missing {section}");
    }
    assert_eq!(out.basis_size, vhci.basis.len());
    assert!(out.stderr_pt2.is_some());

    // restarting from the checkpoint recovers the converged basis
    let restart = config.save_to_file(false).read_from_file(true);
    let again = Vhci::new(restart, Modals::Harmonic(freqs)).unwrap();
    assert_eq!(again.basis.states(), vhci.basis.states());
    let spectrum =
        checkpoint::read_spectrum(spectrum_path(&chk)).unwrap();
    assert_eq!(spectrum.energies.len(), vhci.energies.len());
}
