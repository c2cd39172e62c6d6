//! Configuration settings for running VHCI

use std::{
    fmt::{Debug, Display},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{error::VhciError, fc::RawFc, screen::HbMethod};


/// The maximum number of quanta can be given once for every mode or separately
/// for each mode
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(untagged)]
enum MaxQuanta {
    Single(usize),
    PerMode(Vec<usize>),
}

/// settings for the VSCF modals. every field has a default, so an empty
/// `[vscf]` table is enough to request VSCF modals
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct VscfOptions {
    /// use DIIS to accelerate the SCF iterations
    pub diis: bool,

    /// the number of previous Fock and error matrices to extrapolate from
    pub diis_space: usize,

    /// the iteration at which DIIS extrapolation begins
    pub diis_start: usize,

    pub max_iter: usize,

    /// convergence threshold on the change in the modal coefficients
    pub tol: f64,

    /// convergence threshold on the change in the SCF energy
    pub etol: f64,
}

impl Default for VscfOptions {
    fn default() -> Self {
        Self {
            diis: false,
            diis_space: 5,
            diis_start: 10,
            max_iter: 100,
            tol: 1e-8,
            etol: 1e-6,
        }
    }
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    /// The harmonic frequencies of each mode.
    frequencies: Vec<f64>,

    /// The anharmonic force constants, given as a list of tables with the
    /// modes the derivative is taken with respect to and its value. Cubic
    /// through sextic terms are accepted.
    force_constants: Vec<RawFc>,

    /// The number of harmonic oscillator functions (or VSCF modals) for each
    /// mode. Basis states have fewer than this many quanta in every mode. A
    /// single value is applied to every mode.
    max_quanta: MaxQuanta,

    /// The largest total number of quanta in the initial basis.
    max_total_quanta: usize,

    /// The number of states to converge. Defaults to 10.
    n_states: Option<usize>,

    /// The number of states to correct with PT2. Defaults to `n_states`.
    n_states_pt2: Option<usize>,

    /// The variational screening threshold. Defaults to 0.1.
    eps1: Option<f64>,

    /// The PT2 screening threshold. Must be smaller than eps1. Defaults to
    /// 0.01.
    eps2: Option<f64>,

    /// The threshold for the sampled part of semi-stochastic PT2. A negative
    /// value disables the semi-stochastic split. Defaults to -1.
    eps3: Option<f64>,

    /// The fraction of newly-added states below which the variational loop is
    /// considered converged. Defaults to 0.01.
    tol: Option<f64>,

    /// The maximum number of variational iterations. Defaults to 1000.
    max_iter: Option<usize>,

    /// The number of walkers drawn in each stochastic PT2 sample. Defaults to
    /// 200.
    n_walkers: Option<usize>,

    /// The number of stochastic PT2 samples. Defaults to 50.
    n_samples: Option<usize>,

    /// The heat-bath screening policy: "orig", "max", "exact", or "coupling".
    /// Defaults to "orig".
    hb_method: Option<String>,

    /// The base name for checkpoint files.
    chk_file: Option<String>,

    /// Read the basis from the checkpoint instead of enumerating it.
    read_from_file: Option<bool>,

    /// Save the basis and spectrum to the checkpoint after running.
    save_to_file: Option<bool>,

    /// Print a line for every variational iteration.
    print_hci_steps: Option<bool>,

    /// The largest Hamiltonian dimension to diagonalize as a dense matrix.
    /// Larger matrices use Lanczos. Defaults to 1500.
    dense_limit: Option<usize>,

    /// The seed for the stochastic PT2 random number generators.
    seed: Option<u64>,

    /// The number of threads to use. 0 uses every CPU.
    threads: Option<usize>,

    /// Options for VSCF modals. If this table is present, the Hamiltonian is
    /// expressed in VSCF modals instead of harmonic oscillator functions.
    vscf: Option<VscfOptions>,
}

/// Construct a full `Config` using [Config::load] on a TOML file or use
/// [Config::new] and the Builder pattern
#[derive(Clone, PartialEq, Debug)]
pub struct Config {
    pub frequencies: Vec<f64>,

    /// raw derivatives, scaled when the potential is built
    pub force_constants: Vec<RawFc>,

    /// one entry per mode
    pub max_quanta: Vec<usize>,

    pub max_total_quanta: usize,

    pub n_states: usize,

    /// defaults to `n_states` when unset
    pub n_states_pt2: Option<usize>,

    pub eps1: f64,
    pub eps2: f64,
    pub eps3: f64,

    pub tol: f64,

    pub max_iter: usize,

    pub n_walkers: usize,

    pub n_samples: usize,

    pub hb_method: HbMethod,

    pub chk_file: Option<String>,

    pub read_from_file: bool,

    pub save_to_file: bool,

    pub print_hci_steps: bool,

    pub dense_limit: usize,

    pub seed: u64,

    pub threads: usize,

    pub vscf: Option<VscfOptions>,
}

impl TryFrom<RawConfig> for Config {
    type Error = VhciError;

    fn try_from(rc: RawConfig) -> Result<Self, Self::Error> {
        let nmodes = rc.frequencies.len();
        let max_quanta = match rc.max_quanta {
            MaxQuanta::Single(q) => vec![q; nmodes],
            MaxQuanta::PerMode(v) => v,
        };
        let hb_method = match rc.hb_method {
            Some(s) => s.parse()?,
            None => HbMethod::default(),
        };
        let n_states = rc.n_states.unwrap_or(10);
        Ok(Self {
            frequencies: rc.frequencies,
            force_constants: rc.force_constants,
            max_quanta,
            max_total_quanta: rc.max_total_quanta,
            n_states,
            n_states_pt2: rc.n_states_pt2,
            eps1: rc.eps1.unwrap_or(0.1),
            eps2: rc.eps2.unwrap_or(0.01),
            eps3: rc.eps3.unwrap_or(-1.0),
            tol: rc.tol.unwrap_or(0.01),
            max_iter: rc.max_iter.unwrap_or(1000),
            n_walkers: rc.n_walkers.unwrap_or(200),
            n_samples: rc.n_samples.unwrap_or(50),
            hb_method,
            chk_file: rc.chk_file,
            read_from_file: rc.read_from_file.unwrap_or(false),
            save_to_file: rc.save_to_file.unwrap_or(false),
            print_hci_steps: rc.print_hci_steps.unwrap_or(false),
            dense_limit: rc.dense_limit.unwrap_or(1500),
            seed: rc.seed.unwrap_or(0),
            threads: rc.threads.unwrap_or(0),
            vscf: rc.vscf,
        })
    }
}

macro_rules! int_builders {
    ($($name: ident$(,)*)*) => {
        $(pub fn $name(mut self, i: usize) -> Self {
            self.$name = i;
            self
        })*
    }
}

macro_rules! float_builders {
    ($($name: ident$(,)*)*) => {
        $(pub fn $name(mut self, x: f64) -> Self {
            self.$name = x;
            self
        })*
    }
}

macro_rules! bool_builders {
    ($($name: ident$(,)*)*) => {
        $(pub fn $name(mut self, b: bool) -> Self {
            self.$name = b;
            self
        })*
    }
}

impl Config {
    /// Construct a [Config] with default values for `n_states` (10), `eps1`
    /// (0.1), `eps2` (0.01), `eps3` (-1; disabled), `tol` (0.01), `max_iter`
    /// (1000), `n_walkers` (200), `n_samples` (50), `hb_method` (orig),
    /// `dense_limit` (1500), and no checkpoints or VSCF
    pub fn new(
        frequencies: Vec<f64>,
        force_constants: Vec<RawFc>,
        max_quanta: Vec<usize>,
        max_total_quanta: usize,
    ) -> Self {
        Self {
            frequencies,
            force_constants,
            max_quanta,
            max_total_quanta,
            n_states: 10,
            n_states_pt2: None,
            eps1: 0.1,
            eps2: 0.01,
            eps3: -1.0,
            tol: 0.01,
            max_iter: 1000,
            n_walkers: 200,
            n_samples: 50,
            hb_method: HbMethod::Orig,
            chk_file: None,
            read_from_file: false,
            save_to_file: false,
            print_hci_steps: false,
            dense_limit: 1500,
            seed: 0,
            threads: 0,
            vscf: None,
        }
    }

    int_builders!(
        n_states,
        max_iter,
        n_walkers,
        n_samples,
        dense_limit,
        threads
    );

    float_builders!(eps1, eps2, eps3, tol);

    bool_builders!(read_from_file, save_to_file, print_hci_steps);

    pub fn n_states_pt2(mut self, n: usize) -> Self {
        self.n_states_pt2 = Some(n);
        self
    }

    pub fn hb_method(mut self, m: HbMethod) -> Self {
        self.hb_method = m;
        self
    }

    pub fn chk_file(mut self, s: impl Into<String>) -> Self {
        self.chk_file = Some(s.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn vscf(mut self, opts: VscfOptions) -> Self {
        self.vscf = Some(opts);
        self
    }

    pub fn nmodes(&self) -> usize {
        self.frequencies.len()
    }

    /// the number of states corrected by PT2
    pub fn pt2_states(&self) -> usize {
        self.n_states_pt2.unwrap_or(self.n_states)
    }

    /// semi-stochastic PT2 is requested by a nonnegative `eps3`
    pub fn semi_stochastic(&self) -> bool {
        self.eps3 >= 0.0
    }

    /// load a [Config] from the TOML file specified by `filename` and
    /// [Config::validate] it
    pub fn load<P>(filename: P) -> Result<Self, VhciError>
    where
        P: AsRef<Path> + Debug,
    {
        let contents = std::fs::read_to_string(&filename).map_err(|e| {
            VhciError::ReadFileError(format!("{filename:?}"), e.kind())
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|e| {
            VhciError::ParseError(format!(
                "failed to deserialize config file {filename:?} with {e}"
            ))
        })?;
        let ret = Self::try_from(raw)?;
        ret.validate()?;
        Ok(ret)
    }

    /// check that the settings in `self` make any sense together
    pub fn validate(&self) -> Result<(), VhciError> {
        let err = |s: String| Err(VhciError::Config(s));
        let nmodes = self.nmodes();
        if nmodes == 0 {
            return err("at least one frequency is required".to_owned());
        }
        if self.max_quanta.len() != nmodes {
            return err(format!(
                "max_quanta has {} entries for {nmodes} modes",
                self.max_quanta.len()
            ));
        }
        if self.max_quanta.contains(&0) {
            return err("every mode needs max_quanta of at least 1".to_owned());
        }
        if self.eps2 >= self.eps1 {
            return err(format!(
                "eps2 ({}) must be smaller than eps1 ({})",
                self.eps2, self.eps1
            ));
        }
        if self.semi_stochastic() && self.eps3 >= self.eps2 {
            return err(format!(
                "eps3 ({}) must be smaller than eps2 ({})",
                self.eps3, self.eps2
            ));
        }
        if self.n_states == 0 {
            return err("n_states must be at least 1".to_owned());
        }
        if self.n_walkers < 2 || self.n_samples < 2 {
            return err(format!(
                "n_walkers ({}) and n_samples ({}) must both be at least 2",
                self.n_walkers, self.n_samples
            ));
        }
        if self.vscf.is_some()
            && let Some(q) =
                self.max_quanta.iter().find(|q| **q < self.max_total_quanta)
        {
            return err(format!(
                "VSCF modals need max_quanta >= max_total_quanta, but \
                 {q} < {}",
                self.max_total_quanta
            ));
        }
        if (self.read_from_file || self.save_to_file) && self.chk_file.is_none()
        {
            return err(
                "chk_file is required to read or save checkpoints".to_owned()
            );
        }
        Ok(())
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Config {
            frequencies,
            force_constants,
            max_quanta,
            max_total_quanta,
            n_states,
            n_states_pt2: _,
            eps1,
            eps2,
            eps3,
            tol,
            max_iter,
            n_walkers,
            n_samples,
            hb_method,
            chk_file,
            read_from_file,
            save_to_file,
            print_hci_steps,
            dense_limit,
            seed,
            threads,
            vscf,
        } = self;
        writeln!(f, "\nConfiguration Options:")?;
        writeln!(f, "frequencies = {frequencies:?}")?;
        writeln!(f, "force constants = {}", force_constants.len())?;
        writeln!(f, "max_quanta = {max_quanta:?}")?;
        writeln!(f, "max_total_quanta = {max_total_quanta}")?;
        writeln!(f, "n_states = {n_states}")?;
        writeln!(f, "n_states_pt2 = {}", self.pt2_states())?;
        writeln!(f, "eps1 = {eps1}")?;
        writeln!(f, "eps2 = {eps2}")?;
        writeln!(f, "eps3 = {eps3}")?;
        writeln!(f, "tol = {tol}")?;
        writeln!(f, "max_iter = {max_iter}")?;
        writeln!(f, "n_walkers = {n_walkers}")?;
        writeln!(f, "n_samples = {n_samples}")?;
        writeln!(f, "hb_method = {hb_method}")?;
        writeln!(f, "chk_file = {chk_file:?}")?;
        writeln!(f, "read_from_file = {read_from_file}")?;
        writeln!(f, "save_to_file = {save_to_file}")?;
        writeln!(f, "print_hci_steps = {print_hci_steps}")?;
        writeln!(f, "dense_limit = {dense_limit}")?;
        writeln!(f, "seed = {seed}")?;
        writeln!(f, "threads = {threads}")?;
        match vscf {
            Some(v) => writeln!(f, "vscf = {v:?}"),
            None => writeln!(f, "vscf = false"),
        }
    }
}
