use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Setup – fatal, raised before the batch loop starts
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Input directory does not exist: {0}")]
    MissingInputDir(PathBuf),

    #[error("No files starting with '{prefix}' found in {dir}")]
    NoInputFiles { dir: PathBuf, prefix: String },

    #[error("Parameter '{0}' is already defined")]
    DuplicateParameter(String),

    #[error("Reference file for '{name}' not found: {path}")]
    MissingReference { name: String, path: PathBuf },

    #[error("Unable to read reference file {path}: {reason}")]
    BadReference { path: PathBuf, reason: String },

    #[error("Invalid fit window [{lo}, {hi}]: lower bound must be below upper bound")]
    InvalidFitWindow { lo: f64, hi: f64 },

    #[error("'{0}' is not a species parameter (it has no reference spectrum)")]
    NotASpecies(String),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("None of the {0} dark spectra could be read")]
    NoDarkSpectra(usize),

    #[error("Unable to average dark spectra: {0}")]
    BadDark(String),
}

// ---------------------------------------------------------------------------
// Per-item errors – recoverable, the batch carries on
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SpectrumReadError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}, line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{path}: invalid JSON spectrum: {reason}")]
    Json { path: PathBuf, reason: String },

    #[error("{path}: axis has {x} values but intensity has {y}")]
    LengthMismatch { path: PathBuf, x: usize, y: usize },

    #[error("{0}: no spectral data")]
    Empty(PathBuf),

    #[error("{0}: no acquisition time in metadata")]
    MissingTime(PathBuf),

    #[error("Spectra to average have different lengths ({expected} vs {found})")]
    AxisMismatch { expected: usize, found: usize },

    #[error("No readable spectra among {0} files")]
    NothingToAverage(usize),
}

/// Internal analyser failure; the row is recorded without fit values.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Dark spectrum has {dark} points but the measurement has {spectrum}")]
    DarkMismatch { dark: usize, spectrum: usize },

    #[error("No spectral points inside the fit window [{lo}, {hi}]")]
    EmptyWindow { lo: f64, hi: f64 },

    #[error("Optical depth requested for '{0}' which is not a species parameter")]
    NotASpecies(String),
}

/// The live view could not be updated; the view is disabled, the batch goes on.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("Live view is no longer connected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// Persistence and top-level
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Unable to write results to {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Unable to flush results to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
