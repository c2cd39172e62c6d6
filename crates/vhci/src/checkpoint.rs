//! basis and spectrum checkpoint files

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    Dmat, Dvec,
    basis::{Basis, BasisState},
    eigen::Spectrum,
    error::VhciError,
};

/// the spectrum file that goes with the basis checkpoint `chk`
pub fn spectrum_path(chk: impl AsRef<Path>) -> String {
    format!("{}.spectrum.json", chk.as_ref().display())
}

/// write `basis` to `path`, one state per line with the quanta separated by
/// single spaces
pub fn save_basis(
    path: impl AsRef<Path>,
    basis: &Basis,
) -> Result<(), VhciError> {
    let path = path.as_ref();
    let werr = |e: std::io::Error| {
        VhciError::WriteFileError(path.display().to_string(), e.kind())
    };
    let mut w = BufWriter::new(File::create(path).map_err(werr)?);
    for state in basis.iter() {
        let line: Vec<_> = state.0.iter().map(|q| q.to_string()).collect();
        writeln!(w, "{}", line.join(" ")).map_err(werr)?;
    }
    w.flush().map_err(werr)
}

/// read a basis written by [save_basis]. every line must have `nmodes`
/// entries, blank lines are skipped, and the file must hold at least one
/// state
pub fn read_basis(
    path: impl AsRef<Path>,
    nmodes: usize,
) -> Result<Basis, VhciError> {
    let path = path.as_ref();
    let rerr = |e: std::io::Error| {
        VhciError::ReadFileError(path.display().to_string(), e.kind())
    };
    let f = File::open(path).map_err(rerr)?;
    let mut states = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line.map_err(rerr)?;
        if line.trim().is_empty() {
            continue;
        }
        let state: BasisState = line.parse()?;
        if state.nmodes() != nmodes {
            return Err(VhciError::ParseError(format!(
                "line {} of {} has {} modes, expected {nmodes}",
                i + 1,
                path.display(),
                state.nmodes()
            )));
        }
        states.push(state);
    }
    if states.is_empty() {
        return Err(VhciError::ParseError(format!(
            "no basis states in {}",
            path.display()
        )));
    }
    Ok(Basis::from_states(nmodes, states))
}

/// the JSON form of a [Spectrum], with the eigenvectors stored by column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumCheckpoint {
    pub energies: Vec<f64>,
    pub vectors: Vec<Vec<f64>>,
}

impl From<&Spectrum> for SpectrumCheckpoint {
    fn from(s: &Spectrum) -> Self {
        Self {
            energies: s.energies.iter().copied().collect(),
            vectors: s
                .vectors
                .column_iter()
                .map(|c| c.iter().copied().collect())
                .collect(),
        }
    }
}

impl TryFrom<SpectrumCheckpoint> for Spectrum {
    type Error = VhciError;

    fn try_from(s: SpectrumCheckpoint) -> Result<Self, Self::Error> {
        let nrows = s.vectors.first().map_or(0, Vec::len);
        if s.vectors.len() != s.energies.len()
            || s.vectors.iter().any(|v| v.len() != nrows)
        {
            return Err(VhciError::ParseError(format!(
                "spectrum checkpoint has {} energies and ragged or mismatched \
                 vectors",
                s.energies.len()
            )));
        }
        Ok(Spectrum {
            energies: Dvec::from_vec(s.energies),
            vectors: Dmat::from_iterator(
                nrows,
                s.vectors.len(),
                s.vectors.into_iter().flatten(),
            ),
        })
    }
}

pub fn save_spectrum(
    path: impl AsRef<Path>,
    spectrum: &Spectrum,
) -> Result<(), VhciError> {
    let path = path.as_ref();
    let data = serde_json::to_string_pretty(&SpectrumCheckpoint::from(
        spectrum,
    ))
    .map_err(|e| {
        VhciError::ParseError(format!("failed to serialize spectrum: {e}"))
    })?;
    std::fs::write(path, data).map_err(|e| {
        VhciError::WriteFileError(path.display().to_string(), e.kind())
    })
}

pub fn read_spectrum(path: impl AsRef<Path>) -> Result<Spectrum, VhciError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        VhciError::ReadFileError(path.display().to_string(), e.kind())
    })?;
    let chk: SpectrumCheckpoint = serde_json::from_reader(BufReader::new(f))
        .map_err(|e| {
            VhciError::ParseError(format!(
                "failed to read spectrum from {} with {e}",
                path.display()
            ))
        })?;
    Spectrum::try_from(chk)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn basis_round_trip() {
        let mut basis = Basis::truncated(&[3, 3, 3], 2);
        basis.extend(vec![
            BasisState(vec![5, 0, 1]),
            BasisState(vec![0, 7, 2]),
        ]);
        let tmp = NamedTempFile::new().unwrap();
        save_basis(tmp.path(), &basis).unwrap();

        let contents = std::fs::read_to_string(tmp.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), basis.len());
        assert_eq!(lines[0], "0 0 0");
        assert_eq!(lines.last(), Some(&"0 7 2"));

        let got = read_basis(tmp.path(), 3).unwrap();
        assert_eq!(got, basis);
        assert_eq!(got.highest_quanta(), &[5, 7, 2]);
    }

    #[test]
    fn wrong_modes() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "0 0\n1 0 0\n").unwrap();
        let got = read_basis(tmp.path(), 2);
        assert!(matches!(got, Err(VhciError::ParseError(_))));
        let got = read_basis("/nonexistent/basis.chk", 2);
        assert!(matches!(got, Err(VhciError::ReadFileError(..))));
    }

    #[test]
    fn empty_basis() {
        let tmp = NamedTempFile::new().unwrap();
        for contents in ["", "\n  \n\n"] {
            std::fs::write(tmp.path(), contents).unwrap();
            let got = read_basis(tmp.path(), 2);
            assert!(matches!(got, Err(VhciError::ParseError(_))));
        }
    }

    #[test]
    fn spectrum_round_trip() {
        let spectrum = Spectrum {
            energies: Dvec::from_vec(vec![1.5, 2.5]),
            vectors: Dmat::from_row_slice(
                3,
                2,
                &[0.9, 0.1, 0.3, -0.8, 0.1, 0.2],
            ),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = spectrum_path(dir.path().join("chk"));
        assert!(path.ends_with("chk.spectrum.json"));
        save_spectrum(&path, &spectrum).unwrap();
        let got = read_spectrum(&path).unwrap();
        assert_abs_diff_eq!(got.energies, spectrum.energies, epsilon = 1e-15);
        assert_abs_diff_eq!(got.vectors, spectrum.vectors, epsilon = 1e-15);
    }
}
