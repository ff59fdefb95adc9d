use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analysis::{Analyser, FitOptions};
use crate::data::loader::SpectrumLoader;
use crate::error::{PipelineError, SetupError, SpectrumReadError};
use crate::live::LiveView;
use crate::params::Parameters;
use crate::results::ResultTable;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared stop request, checked before each spectrum.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// What a finished (or interrupted) batch produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub table: ResultTable,
    /// Spectra that could not be read.
    pub unread: usize,
    /// Spectra the analyser could not fit at all.
    pub failed: usize,
    /// Fits flagged through `nerr`.
    pub degraded: usize,
    pub cancelled: bool,
    pub output: PathBuf,
}

// ---------------------------------------------------------------------------
// BatchDriver
// ---------------------------------------------------------------------------

/// Runs one analyser over a list of spectra, in sorted order.
pub struct BatchDriver<A, L> {
    analyser: A,
    loader: L,
    params: Parameters,
    options: FitOptions,
    view: Option<LiveView>,
    cancel: CancelFlag,
}

impl<A: Analyser, L: SpectrumLoader> BatchDriver<A, L> {
    pub fn new(
        analyser: A,
        loader: L,
        params: Parameters,
        options: FitOptions,
    ) -> Result<Self, SetupError> {
        options.validate(&params)?;
        Ok(BatchDriver {
            analyser,
            loader,
            params,
            options,
            view: None,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_view(mut self, view: LiveView) -> Self {
        self.view = Some(view);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current seeds (warm-started values after a run).
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn view(&self) -> Option<&LiveView> {
        self.view.as_ref()
    }

    /// Average the dark spectra and hand the result to the analyser.
    ///
    /// No dark files means no dark correction.
    pub fn install_dark(&mut self, dark_files: &[PathBuf]) -> Result<(), SetupError> {
        if dark_files.is_empty() {
            log::warn!("No dark spectra given; fitting without dark correction");
            return Ok(());
        }
        let (_, dark) = self.loader.average(dark_files).map_err(|e| match e {
            SpectrumReadError::NothingToAverage(n) => SetupError::NoDarkSpectra(n),
            other => SetupError::BadDark(other.to_string()),
        })?;
        log::info!("Averaged {} dark spectra", dark_files.len());
        self.analyser.set_dark(dark);
        Ok(())
    }

    /// Process every measurement and write the table to `output`.
    ///
    /// Rows follow the lexicographic order of `measurements`; one row per
    /// spectrum. The table is written once, after the loop, even when the
    /// run was cancelled.
    pub fn run(
        &mut self,
        dark_files: &[PathBuf],
        measurements: &[PathBuf],
        output: &Path,
    ) -> Result<RunReport, PipelineError> {
        self.install_dark(dark_files)?;

        let mut files = measurements.to_vec();
        files.sort();

        let order: Vec<String> = self.params.names().map(str::to_string).collect();
        let mut table = ResultTable::new(&self.params);
        let (mut unread, mut failed, mut degraded) = (0, 0, 0);
        let mut cancelled = false;
        let total = files.len();

        if let Some(view) = self.view.as_mut() {
            view.open(total);
        }
        log::info!("Beginning analysis of {total} spectra");

        for (index, path) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("Run cancelled after {index} of {total} spectra");
                cancelled = true;
                break;
            }

            let spectrum = match self.loader.load(path) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("[{}/{total}] {e}", index + 1);
                    unread += 1;
                    table.push_unfitted(index, None);
                    if let Some(view) = self.view.as_mut() {
                        view.skip(index, e.to_string());
                    }
                    continue;
                }
            };

            match self.analyser.fit(&spectrum, &self.params, &self.options) {
                Ok(fit) => {
                    if fit.is_degraded() {
                        degraded += 1;
                        log::warn!(
                            "[{}/{total}] {}: degraded fit (nerr {})",
                            index + 1,
                            path.display(),
                            fit.nerr
                        );
                    } else {
                        if self.options.update_params {
                            self.params.update_from(&fit.fit_values);
                        }
                        log::info!("[{}/{total}] {}", index + 1, path.display());
                    }
                    table.push_fit(index, &fit);
                    if let Some(view) = self.view.as_mut() {
                        view.update(index, &fit, &order);
                    }
                }
                Err(e) => {
                    log::warn!("[{}/{total}] {}: {e}", index + 1, path.display());
                    failed += 1;
                    table.push_failed(index, spectrum.time.clone());
                    if let Some(view) = self.view.as_mut() {
                        view.skip(index, e.to_string());
                    }
                }
            }
        }

        log::info!("Saving {} rows to {}", table.len(), output.display());
        let saved = table.write_csv(output);

        if let Some(view) = self.view.as_mut() {
            view.close(table.len(), output.to_path_buf(), cancelled);
        }
        saved?;

        Ok(RunReport {
            table,
            unread,
            failed,
            degraded,
            cancelled,
            output: output.to_path_buf(),
        })
    }
}
