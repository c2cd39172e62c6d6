use std::io::Write;

use log::{debug, info};

use checkpoint::{read_basis, save_basis, save_spectrum, spectrum_path};
use eigen::{Spectrum, diagonalize_dense, diagonalize_sparse};
use hamiltonian::{
    SparseHamiltonian, build_dense, build_incremental, build_sparse,
};
use pt2::{Spt2Settings, pt2, spt2};
use screen::ScreenResult;

pub mod basis;
pub mod checkpoint;
pub mod config;
pub mod connect;
pub mod eigen;
pub mod error;
pub mod fc;
pub mod hamiltonian;
pub mod modal;
pub mod output;
pub mod pt2;
pub mod screen;

pub use basis::Basis;
pub use config::{Config, VscfOptions};
pub use error::VhciError;
pub use fc::{ForceConstant, Potential, RawFc};
pub use modal::{Modals, VscfModals};
pub use output::Output;
pub use screen::HbMethod;

#[cfg(test)]
mod tests;

pub type Dvec = nalgebra::DVector<f64>;
pub type Dmat = nalgebra::DMatrix<f64>;

/// print a message to stderr and exit with status 1
#[macro_export]
macro_rules! die {
    ($($t:tt)*) => {{
        eprintln!($($t)*);
        std::process::exit(1);
    }};
}

/// call `rayon::ThreadPoolBuilder` to set `num_threads` to `n`. Discards the
/// error returned by `build_global` if the thread pool has already been
/// initialized
pub fn max_threads(n: usize) {
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build_global();
}

/// the stages run by [Vhci::kernel] after the initial VCI
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kernel {
    /// grow the basis with heat-bath screening
    pub do_vhci: bool,

    /// deterministic PT2
    pub do_pt2: bool,

    /// stochastic or semi-stochastic PT2, depending on `eps3`
    pub do_spt2: bool,

    /// compare PT2, SPT2, and SSPT2 with `eps3 = eps2` and `eps2 *= 10`
    pub compare_pt2: bool,
}

impl Default for Kernel {
    fn default() -> Self {
        Self {
            do_vhci: true,
            do_pt2: false,
            do_spt2: false,
            compare_pt2: false,
        }
    }
}

fn write_err(e: std::io::Error) -> VhciError {
    VhciError::WriteFileError(String::from("output"), e.kind())
}

/// a VHCI calculation: the potential and modals it is built from along with
/// the current basis, spectrum, and PT2 corrections
#[derive(Debug)]
pub struct Vhci {
    pub config: Config,
    pub potential: Potential,
    pub modals: Modals,
    pub basis: Basis,

    /// the lowest `n_states` eigenvalues
    pub energies: Dvec,

    /// the corresponding eigenvectors in the columns
    pub vectors: Dmat,

    pub de_pt2: Option<Vec<f64>>,

    /// standard errors of `de_pt2` from stochastic PT2
    pub se_pt2: Option<Vec<f64>>,

    /// the number of iterations taken by the last call to [Vhci::hci]
    pub iterations: usize,

    hamiltonian: Option<SparseHamiltonian>,

    /// states at the end of the basis that are not yet in `hamiltonian`
    new_states: usize,
}

impl Vhci {
    /// set up the potential and the initial basis described by `config` and
    /// diagonalize the Hamiltonian in that basis. the basis is read from the
    /// checkpoint file when `config.read_from_file` is set, and otherwise
    /// enumerated from `max_quanta` and `max_total_quanta`
    pub fn new(config: Config, modals: Modals) -> Result<Self, VhciError> {
        config.validate()?;
        let nmodes = config.nmodes();
        if modals.nmodes() != nmodes {
            return Err(VhciError::Config(format!(
                "modals are for {} modes, but there are {nmodes} frequencies",
                modals.nmodes()
            )));
        }
        let potential = Potential::from_raw(nmodes, &config.force_constants)?;
        let basis = match (&config.chk_file, config.read_from_file) {
            (Some(chk), true) => {
                info!("reading basis from {chk}");
                read_basis(chk, nmodes)?
            }
            _ => Basis::truncated(&config.max_quanta, config.max_total_quanta),
        };
        if basis.is_empty() {
            return Err(VhciError::Config("the initial basis is empty".into()));
        }
        if let Some(mq) = modals.max_quanta()
            && let Some(s) = basis
                .iter()
                .find(|s| s.0.iter().zip(mq).any(|(q, m)| q >= m))
        {
            return Err(VhciError::Config(format!(
                "basis state {s} is outside of the modal basis {mq:?}"
            )));
        }
        info!(
            "{} force constants, initial basis of {} states",
            potential.len(),
            basis.len()
        );
        let mut ret = Self {
            config,
            potential,
            modals,
            basis,
            energies: Dvec::zeros(0),
            vectors: Dmat::zeros(0, 0),
            de_pt2: None,
            se_pt2: None,
            iterations: 0,
            hamiltonian: None,
            new_states: 0,
        };
        ret.diagonalize();
        Ok(ret)
    }

    /// the persistent sparse Hamiltonian, once [Vhci::sparse_diagonalize] has
    /// built it
    pub fn hamiltonian(&self) -> Option<&SparseHamiltonian> {
        self.hamiltonian.as_ref()
    }

    fn set_spectrum(&mut self, spectrum: Spectrum) {
        self.energies = spectrum.energies;
        self.vectors = spectrum.vectors;
        self.de_pt2 = None;
        self.se_pt2 = None;
    }

    /// build the dense Hamiltonian over the whole basis and diagonalize it.
    /// this drops the persistent sparse Hamiltonian
    pub fn diagonalize(&mut self) {
        let h = build_dense(&self.basis, &self.potential, &self.modals);
        self.set_spectrum(diagonalize_dense(h, self.config.n_states));
        self.hamiltonian = None;
        self.new_states = self.basis.len();
    }

    /// bring the persistent sparse Hamiltonian up to date with the basis,
    /// adding only the blocks for states appended since the last call, and
    /// diagonalize it
    pub fn sparse_diagonalize(&mut self) {
        let fresh = self.hamiltonian.is_none();
        let h = self.hamiltonian.get_or_insert_with(|| {
            SparseHamiltonian::new(build_sparse(
                &self.basis,
                &self.potential,
                &self.modals,
            ))
        });
        if !fresh && self.new_states > 0 {
            let n_old = self.basis.len() - self.new_states;
            let (old_new, new_new) = build_incremental(
                &self.basis,
                n_old,
                &self.potential,
                &self.modals,
            );
            h.append(&old_new, &new_new);
        }
        self.new_states = 0;
        debug!("sparse Hamiltonian with {} nonzeros", h.matrix.nnz());
        let spectrum = diagonalize_sparse(
            h,
            self.config.n_states,
            self.config.dense_limit,
        );
        self.set_spectrum(spectrum);
    }

    /// the largest coefficient of each basis state over the states being
    /// converged
    fn screening_coeffs(&self) -> Vec<f64> {
        let k = self.config.n_states.min(self.vectors.ncols());
        (0..self.vectors.nrows())
            .map(|m| {
                (0..k)
                    .map(|j| self.vectors[(m, j)].abs())
                    .fold(0.0, f64::max)
            })
            .collect()
    }

    /// screen the current basis with the configured policy and threshold
    /// `eps`
    pub fn screen_basis(&self, eps: f64) -> ScreenResult {
        let policy = self.config.hb_method.policy(&self.config.max_quanta);
        policy.screen(
            &self.basis,
            &self.potential,
            &self.modals,
            &self.screening_coeffs(),
            eps,
        )
    }

    /// one round of heat-bath screening at `eps`, appending the selected
    /// states to the basis. returns the number of states added
    pub fn hci_step(&mut self, eps: f64) -> usize {
        let res = self.screen_basis(eps);
        let added = self.basis.extend(res.states);
        self.new_states += added;
        added
    }

    /// grow the basis until the fraction of states added in an iteration is at
    /// most `tol`, returning the number of iterations taken. a line for each
    /// iteration is written to `w` if `print_hci_steps` is set
    pub fn hci(&mut self, w: &mut impl Write) -> Result<usize, VhciError> {
        let mut iter = 0;
        loop {
            iter += 1;
            let added = self.hci_step(self.config.eps1);
            self.sparse_diagonalize();
            let frac = added as f64 / self.basis.len() as f64;
            info!(
                "VHCI iteration {iter}: added {added} states, basis size {}, \
                 lowest energy {:.8}",
                self.basis.len(),
                self.energies.get(0).copied().unwrap_or(0.0)
            );
            if self.config.print_hci_steps {
                writeln!(
                    w,
                    "VHCI iteration {iter:5}{added:8}{:10}{frac:12.6}",
                    self.basis.len()
                )
                .map_err(write_err)?;
            }
            if frac <= self.config.tol {
                self.iterations = iter;
                return Ok(iter);
            }
            if iter >= self.config.max_iter {
                self.iterations = iter;
                return Err(VhciError::NonConvergence {
                    iterations: iter,
                    basis_size: self.basis.len(),
                });
            }
        }
    }

    fn spt2_settings(&self) -> Spt2Settings {
        Spt2Settings {
            n_walkers: self.config.n_walkers,
            n_samples: self.config.n_samples,
            eps3: self.config.eps3,
            semi_stochastic: self.config.semi_stochastic(),
            seed: self.config.seed,
        }
    }

    /// compute second-order corrections for the lowest `n_states_pt2` states,
    /// stochastically if `stochastic` is set
    pub fn pt2(&mut self, stochastic: bool) -> Result<(), VhciError> {
        let Config { eps1, eps2, .. } = self.config;
        if eps2 >= eps1 {
            return Err(VhciError::Config(format!(
                "eps2 ({eps2}) must be smaller than eps1 ({eps1})"
            )));
        }
        let n = self.config.pt2_states();
        if stochastic {
            let (de, se) = spt2(
                &self.energies,
                &self.vectors,
                &self.basis,
                &self.potential,
                &self.modals,
                eps2,
                n,
                &self.spt2_settings(),
            )?;
            self.de_pt2 = Some(de);
            self.se_pt2 = Some(se);
        } else {
            self.de_pt2 = Some(pt2(
                &self.energies,
                &self.vectors,
                &self.basis,
                &self.potential,
                &self.modals,
                eps2,
                n,
            ));
            self.se_pt2 = None;
        }
        Ok(())
    }

    /// the variational energies plus the current PT2 corrections
    pub fn energies_pt2(&self) -> Option<Vec<f64>> {
        self.de_pt2.as_ref().map(|de| {
            de.iter().zip(self.energies.iter()).map(|(d, e)| d + e).collect()
        })
    }

    pub fn output(&self) -> Output {
        let n = self.de_pt2.as_ref().map_or(self.energies.len(), Vec::len);
        Output::new(
            self.energies.iter().take(n).copied().collect(),
            &self.vectors.columns(0, n).into_owned(),
            &self.basis,
            self.energies_pt2(),
            self.se_pt2.clone(),
        )
    }

    /// write the basis to the checkpoint file and the spectrum next to it
    pub fn save(&self) -> Result<(), VhciError> {
        let Some(chk) = &self.config.chk_file else {
            return Err(VhciError::Config(
                "chk_file is required to save checkpoints".to_owned(),
            ));
        };
        save_basis(chk, &self.basis)?;
        save_spectrum(
            spectrum_path(chk),
            &Spectrum {
                energies: self.energies.clone(),
                vectors: self.vectors.clone(),
            },
        )?;
        info!("saved checkpoint to {chk}");
        Ok(())
    }

    /// PT2 at `eps2` alongside SPT2 at `eps2` and SSPT2 with the sampled part
    /// at `eps2` and the deterministic part at `10 * eps2`
    fn compare_pt2(&self, w: &mut impl Write) -> Result<(), VhciError> {
        let n = self.config.pt2_states();
        let eps2 = self.config.eps2;
        let Self {
            energies,
            vectors,
            basis,
            potential,
            modals,
            ..
        } = self;
        let det = pt2(energies, vectors, basis, potential, modals, eps2, n);
        let run = |eps: f64, settings: Spt2Settings| {
            spt2(
                energies, vectors, basis, potential, modals, eps, n, &settings,
            )
        };
        let (sde, sse) = run(
            eps2,
            Spt2Settings {
                semi_stochastic: false,
                ..self.spt2_settings()
            },
        )?;
        let (ssde, ssse) = run(
            eps2 * 10.0,
            Spt2Settings {
                eps3: eps2,
                semi_stochastic: true,
                ..self.spt2_settings()
            },
        )?;
        writeln!(w, "===== PT2 COMPARISON =====").map_err(write_err)?;
        writeln!(
            w,
            "{:>5}{:>18}{:>18}{:>14}{:>18}{:>14}",
            "state", "PT2", "SPT2", "+/-", "SSPT2", "+/-"
        )
        .map_err(write_err)?;
        for k in 0..det.len() {
            writeln!(
                w,
                "{k:5}{:18.8}{:18.8}{:14.4e}{:18.8}{:14.4e}",
                det[k], sde[k], sse[k], ssde[k], ssse[k]
            )
            .map_err(write_err)?;
        }
        Ok(())
    }

    fn write_section(
        &self,
        w: &mut impl Write,
        title: &str,
    ) -> Result<(), VhciError> {
        writeln!(w, "===== {title} RESULTS =====").map_err(write_err)?;
        writeln!(w, "{}", self.output()).map_err(write_err)
    }

    /// run the stages selected in `opts`, writing a report of each to `w`, and
    /// save the checkpoint files if requested. returns the final [Output]
    pub fn kernel(
        &mut self,
        w: &mut impl Write,
        opts: Kernel,
    ) -> Result<Output, VhciError> {
        writeln!(w, "{}", self.config).map_err(write_err)?;
        self.write_section(w, "VCI")?;
        if opts.do_vhci {
            let iters = self.hci(w)?;
            info!("VHCI converged after {iters} iterations");
            self.write_section(w, "VHCI")?;
        }
        if opts.do_pt2 {
            self.pt2(false)?;
            self.write_section(w, "VHCI+PT2")?;
        }
        if opts.do_spt2 {
            self.pt2(true)?;
            let title = if self.config.semi_stochastic() {
                "VHCI+SSPT2"
            } else {
                "VHCI+SPT2"
            };
            self.write_section(w, title)?;
        }
        if opts.compare_pt2 {
            self.compare_pt2(w)?;
        }
        if self.config.save_to_file {
            self.save()?;
        }
        Ok(self.output())
    }
}
