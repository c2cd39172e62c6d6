use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq)]
pub enum VhciError {
    /// an invalid combination of settings, reported where it is detected
    Config(String),

    /// the variational growth loop hit `max_iter` without reaching `tol`
    NonConvergence {
        iterations: usize,
        basis_size: usize,
    },

    /// the stochastic estimator could not set up its sampling distribution
    Sampling(String),

    ReadFileError(String, std::io::ErrorKind),

    WriteFileError(String, std::io::ErrorKind),

    ParseError(String),
}

impl VhciError {
    /// Returns `true` if the error is [`NonConvergence`].
    ///
    /// [`NonConvergence`]: VhciError::NonConvergence
    #[must_use]
    pub fn is_non_convergence(&self) -> bool {
        matches!(self, Self::NonConvergence { .. })
    }

    /// Returns `true` if the error is [`Config`].
    ///
    /// [`Config`]: VhciError::Config
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(..))
    }
}

impl Display for VhciError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VhciError::Config(s) => write!(f, "configuration error: {s}"),
            VhciError::NonConvergence {
                iterations,
                basis_size,
            } => write!(
                f,
                "VHCI did not converge after {iterations} iterations \
                 with {basis_size} basis states"
            ),
            VhciError::Sampling(s) => write!(f, "sampling error: {s}"),
            VhciError::ReadFileError(file, kind) => {
                write!(f, "failed to read {file}: {kind}")
            }
            VhciError::WriteFileError(file, kind) => {
                write!(f, "failed to write {file}: {kind}")
            }
            VhciError::ParseError(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl Error for VhciError {}
