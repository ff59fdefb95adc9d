use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use crate::color::quality_color;
use crate::driver::CancelFlag;
use crate::state::MonitorState;

// ---------------------------------------------------------------------------
// Left side panel – latest fit parameters
// ---------------------------------------------------------------------------

/// Render the parameter table of the latest fit.
pub fn side_panel(ui: &mut Ui, state: &MonitorState) {
    ui.heading("Fit parameters");
    ui.separator();

    let Some(frame) = &state.latest else {
        ui.label("No fit yet.");
        return;
    };

    ui.label(format!("Spectrum {}  ({})", frame.index, frame.time));
    let quality = if frame.nerr == 0 {
        "fit ok".to_string()
    } else {
        format!("degraded fit (nerr {})", frame.nerr)
    };
    ui.label(RichText::new(quality).color(quality_color(frame.nerr)));
    ui.separator();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            TableBuilder::new(ui)
                .striped(true)
                .column(Column::auto().at_least(70.0))
                .column(Column::auto().at_least(80.0))
                .column(Column::remainder())
                .header(20.0, |mut header| {
                    header.col(|ui| {
                        ui.strong("Name");
                    });
                    header.col(|ui| {
                        ui.strong("Value");
                    });
                    header.col(|ui| {
                        ui.strong("Error");
                    });
                })
                .body(|mut body| {
                    for (name, value, error) in &frame.params {
                        body.row(18.0, |mut row| {
                            row.col(|ui| {
                                ui.label(name.as_str());
                            });
                            row.col(|ui| {
                                ui.monospace(format!("{value:.4e}"));
                            });
                            row.col(|ui| {
                                ui.monospace(format!("{error:.2e}"));
                            });
                        });
                    }
                });
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render progress, the stop button and status messages.
pub fn top_bar(ui: &mut Ui, state: &mut MonitorState, cancel: &CancelFlag) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        match (state.total, &state.finished) {
            (None, _) => {
                ui.label("Preparing analysis…");
            }
            (Some(total), None) => {
                ui.label(format!("{} / {total} spectra", state.processed));
                ui.add(
                    egui::ProgressBar::new(state.progress())
                        .desired_width(200.0)
                        .show_percentage(),
                );
            }
            (Some(_), Some((rows, output, cancelled))) => {
                let verb = if *cancelled { "Cancelled" } else { "Done" };
                ui.label(format!(
                    "{verb}: {rows} rows saved to {}. Close the window to exit.",
                    output.display()
                ));
            }
        }

        ui.separator();

        let stop = ui.add_enabled(
            state.is_running() && !cancel.is_cancelled(),
            egui::Button::new("Stop"),
        );
        if stop.clicked() {
            log::info!("Stop requested from the monitor window");
            cancel.cancel();
            state.status_message = Some("Stopping after the current spectrum…".to_string());
        }

        if state.skipped > 0 {
            ui.separator();
            ui.label(format!("{} skipped", state.skipped));
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}
