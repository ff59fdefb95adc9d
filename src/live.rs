use std::path::PathBuf;
use std::sync::mpsc::Sender;

use crate::analysis::FitResult;
use crate::error::VisualizationError;

// ---------------------------------------------------------------------------
// Events pushed from the batch to the monitor
// ---------------------------------------------------------------------------

/// Plot data for one processed spectrum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitFrame {
    pub index: usize,
    pub time: String,
    pub grid: Vec<f64>,
    pub spec: Vec<f64>,
    pub fit: Vec<f64>,
    pub resid: Vec<f64>,
    /// Optical depth of the plotted species; empty when not computed.
    pub meas_od: Vec<f64>,
    pub synth_od: Vec<f64>,
    /// New point of the time series, `[index, value]`.
    pub point: Option<[f64; 2]>,
    /// `(name, value, error)` in registry order.
    pub params: Vec<(String, f64, f64)>,
    pub nerr: u32,
    /// Set on the first frame only.
    pub tighten: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Started {
        total: usize,
        species: String,
        series: String,
    },
    Frame(FitFrame),
    Skipped {
        index: usize,
        reason: String,
    },
    Finished {
        rows: usize,
        output: PathBuf,
        cancelled: bool,
    },
}

/// Where view events go.
pub trait ViewSink {
    fn send(&mut self, event: ViewEvent) -> Result<(), VisualizationError>;
}

/// Sends events to a monitor window over an mpsc channel.
pub struct ChannelSink(pub Sender<ViewEvent>);

impl ViewSink for ChannelSink {
    fn send(&mut self, event: ViewEvent) -> Result<(), VisualizationError> {
        self.0.send(event).map_err(|_| VisualizationError::Disconnected)
    }
}

// ---------------------------------------------------------------------------
// LiveView – driver-side state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Uninitialized,
    Ready,
    Updating,
    Closed,
}

/// Best-effort live view of the batch.
///
/// `Uninitialized → Ready → Updating → Closed`. A failed send disables the
/// sink for the rest of the run; the phase keeps following the batch.
pub struct LiveView {
    sink: Option<Box<dyn ViewSink + Send>>,
    phase: ViewPhase,
    species: String,
    series: String,
    tightened: bool,
}

impl LiveView {
    /// `species` selects the optical depth panel, `series` the time-series panel.
    pub fn new(sink: Box<dyn ViewSink + Send>, species: &str, series: &str) -> Self {
        LiveView {
            sink: Some(sink),
            phase: ViewPhase::Uninitialized,
            species: species.to_string(),
            series: series.to_string(),
            tightened: false,
        }
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// Whether events still reach the sink.
    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    /// Lay out the (empty) view before the loop starts.
    pub fn open(&mut self, total: usize) {
        if self.phase != ViewPhase::Uninitialized {
            return;
        }
        self.phase = ViewPhase::Ready;
        let event = ViewEvent::Started {
            total,
            species: self.species.clone(),
            series: self.series.clone(),
        };
        self.emit(event);
    }

    /// Publish one fit.
    pub fn update(&mut self, index: usize, fit: &FitResult, order: &[String]) {
        if !matches!(self.phase, ViewPhase::Ready | ViewPhase::Updating) {
            return;
        }
        self.phase = ViewPhase::Updating;
        if self.sink.is_none() {
            return;
        }

        let tighten = !self.tightened;
        self.tightened = true;

        let frame = FitFrame {
            index,
            time: fit.time.clone(),
            grid: fit.grid.clone(),
            spec: fit.spec.clone(),
            fit: fit.fit.clone(),
            resid: fit.resid.clone(),
            meas_od: fit.meas_od.get(&self.species).cloned().unwrap_or_default(),
            synth_od: fit.synth_od.get(&self.species).cloned().unwrap_or_default(),
            point: fit
                .fit_values
                .get(&self.series)
                .map(|&v| [index as f64, v]),
            params: order
                .iter()
                .filter_map(|name| {
                    let value = *fit.fit_values.get(name)?;
                    let error = fit.fit_errors.get(name).copied().unwrap_or(f64::NAN);
                    Some((name.clone(), value, error))
                })
                .collect(),
            nerr: fit.nerr,
            tighten,
        };
        self.emit(ViewEvent::Frame(frame));
    }

    /// Report a spectrum that produced no fit.
    pub fn skip(&mut self, index: usize, reason: String) {
        if matches!(self.phase, ViewPhase::Ready | ViewPhase::Updating) {
            self.emit(ViewEvent::Skipped { index, reason });
        }
    }

    /// End of the batch. Waiting for the user happens on the window side.
    pub fn close(&mut self, rows: usize, output: PathBuf, cancelled: bool) {
        if self.phase == ViewPhase::Closed {
            return;
        }
        let was_open = self.phase != ViewPhase::Uninitialized;
        self.phase = ViewPhase::Closed;
        if was_open {
            self.emit(ViewEvent::Finished {
                rows,
                output,
                cancelled,
            });
        }
    }

    fn emit(&mut self, event: ViewEvent) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(event) {
            log::warn!("{e}; continuing without live view");
            self.sink = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::mpsc;

    fn fit(so2: f64) -> FitResult {
        FitResult {
            grid: vec![1.0, 2.0],
            spec: vec![10.0, 11.0],
            fit: vec![10.1, 10.9],
            resid: vec![-1.0, 0.9],
            meas_od: BTreeMap::from([("SO2".to_string(), vec![0.1, 0.2])]),
            synth_od: BTreeMap::from([("SO2".to_string(), vec![0.1, 0.19])]),
            fit_values: BTreeMap::from([("SO2".to_string(), so2)]),
            fit_errors: BTreeMap::from([("SO2".to_string(), 1.0)]),
            ..Default::default()
        }
    }

    #[test]
    fn phases_follow_the_batch() {
        let (tx, rx) = mpsc::channel();
        let mut view = LiveView::new(Box::new(ChannelSink(tx)), "SO2", "SO2");
        let order = vec!["SO2".to_string()];
        assert_eq!(view.phase(), ViewPhase::Uninitialized);

        // Updates before open are ignored.
        view.update(0, &fit(1.0), &order);
        assert_eq!(view.phase(), ViewPhase::Uninitialized);

        view.open(2);
        assert_eq!(view.phase(), ViewPhase::Ready);
        view.update(0, &fit(1.0), &order);
        view.update(1, &fit(2.0), &order);
        assert_eq!(view.phase(), ViewPhase::Updating);
        view.close(2, PathBuf::from("out.csv"), false);
        assert_eq!(view.phase(), ViewPhase::Closed);

        let events: Vec<ViewEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ViewEvent::Started { total: 2, .. }));
        let ViewEvent::Frame(first) = &events[1] else {
            panic!("expected a frame");
        };
        assert!(first.tighten);
        assert_eq!(first.point, Some([0.0, 1.0]));
        assert_eq!(first.meas_od, [0.1, 0.2]);
        assert_eq!(first.params, [("SO2".to_string(), 1.0, 1.0)]);
        let ViewEvent::Frame(second) = &events[2] else {
            panic!("expected a frame");
        };
        assert!(!second.tighten);
        assert_eq!(second.point, Some([1.0, 2.0]));
        assert!(matches!(&events[3], ViewEvent::Finished { rows: 2, .. }));
    }

    #[test]
    fn dropped_window_disables_the_view() {
        let (tx, rx) = mpsc::channel();
        let mut view = LiveView::new(Box::new(ChannelSink(tx)), "SO2", "SO2");
        drop(rx);

        view.open(1);
        assert!(!view.is_connected());
        view.update(0, &fit(1.0), &[]);
        view.close(1, PathBuf::from("out.csv"), false);
        assert_eq!(view.phase(), ViewPhase::Closed);
    }

    #[test]
    fn closing_an_unopened_view_is_silent() {
        let (tx, rx) = mpsc::channel();
        let mut view = LiveView::new(Box::new(ChannelSink(tx)), "SO2", "SO2");
        view.close(0, PathBuf::from("out.csv"), false);
        assert_eq!(view.phase(), ViewPhase::Closed);
        assert!(rx.try_iter().next().is_none());
    }
}
