use std::path::PathBuf;

use crate::live::{FitFrame, ViewEvent};

// ---------------------------------------------------------------------------
// Monitor state
// ---------------------------------------------------------------------------

/// Everything the monitor window shows, independent of rendering.
pub struct MonitorState {
    /// Spectra in the batch (known once the run starts).
    pub total: Option<usize>,

    /// Species shown in the optical depth plot.
    pub species: String,

    /// Parameter shown in the time-series plot.
    pub series_name: String,

    /// Latest fit, replaced on every frame.
    pub latest: Option<FitFrame>,

    /// Running time series; grows by one point per frame.
    pub series: Vec<[f64; 2]>,

    /// Spectra handled so far, including skipped ones.
    pub processed: usize,

    pub skipped: usize,

    /// Plots re-fit their bounds to new data on the next draw.
    pub rescale: bool,

    /// One-time layout tightening is pending.
    pub tighten: bool,

    /// Set once the batch has ended.
    pub finished: Option<(usize, PathBuf, bool)>,

    /// Status / warning line shown in the UI.
    pub status_message: Option<String>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            total: None,
            species: String::new(),
            series_name: String::new(),
            latest: None,
            series: Vec::new(),
            processed: 0,
            skipped: 0,
            rescale: false,
            tighten: false,
            finished: None,
            status_message: None,
        }
    }
}

impl MonitorState {
    /// Apply one event from the batch.
    pub fn ingest(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Started {
                total,
                species,
                series,
            } => {
                self.total = Some(total);
                self.species = species;
                self.series_name = series;
            }
            ViewEvent::Frame(frame) => {
                self.processed += 1;
                if let Some(point) = frame.point {
                    self.series.push(point);
                }
                if frame.tighten {
                    self.tighten = true;
                }
                self.status_message = None;
                self.latest = Some(frame);
                self.rescale = true;
            }
            ViewEvent::Skipped { index, reason } => {
                self.processed += 1;
                self.skipped += 1;
                self.status_message = Some(format!("Spectrum {index}: {reason}"));
            }
            ViewEvent::Finished {
                rows,
                output,
                cancelled,
            } => {
                self.finished = Some((rows, output, cancelled));
            }
        }
    }

    /// Fraction of the batch done, for the progress bar.
    pub fn progress(&self) -> f32 {
        match self.total {
            Some(0) | None => 0.0,
            Some(total) => self.processed as f32 / total as f32,
        }
    }

    pub fn is_running(&self) -> bool {
        self.total.is_some() && self.finished.is_none()
    }
}
