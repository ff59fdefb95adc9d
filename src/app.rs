use std::sync::mpsc::Receiver;
use std::time::Duration;

use eframe::egui;

use crate::color::PlotColors;
use crate::driver::CancelFlag;
use crate::live::ViewEvent;
use crate::state::MonitorState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

/// Live fit monitor fed by a running batch.
pub struct FitMonitorApp {
    pub rx: Receiver<ViewEvent>,
    pub state: MonitorState,
    pub cancel: CancelFlag,
    pub colors: PlotColors,
}

impl FitMonitorApp {
    pub fn new(rx: Receiver<ViewEvent>, cancel: CancelFlag) -> Self {
        Self {
            rx,
            state: MonitorState::default(),
            cancel,
            colors: PlotColors::default(),
        }
    }
}

impl eframe::App for FitMonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for event in self.rx.try_iter() {
            self.state.ingest(event);
        }

        // ---- Top panel: progress and controls ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state, &self.cancel);
        });

        // ---- Left side panel: latest fit parameters ----
        egui::SidePanel::left("param_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &self.state);
            });

        // ---- Central panel: the four fit plots ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::fit_plots(ui, &mut self.state, &self.colors);
        });

        if self.state.finished.is_none() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}
