use eframe::egui::{Color32, Ui};
use egui_plot::{Legend, Line, MarkerShape, Plot, PlotPoints, PlotUi, Points};

use crate::color::PlotColors;
use crate::state::MonitorState;

// ---------------------------------------------------------------------------
// Fit plots (central panel)
// ---------------------------------------------------------------------------

/// Render the 2×2 grid: spectrum, residual, optical depth, time series.
pub fn fit_plots(ui: &mut Ui, state: &mut MonitorState, colors: &PlotColors) {
    let Some(frame) = &state.latest else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Waiting for the first fit…");
        });
        return;
    };

    let rescale = state.rescale;
    let tighten = state.tighten;
    let height = ((ui.available_height() - ui.spacing().item_spacing.y) / 2.0).max(80.0);

    ui.columns(2, |cols| {
        // ---- Measured vs fitted spectrum ----
        let mut plot = Plot::new("spectrum_plot")
            .height(height)
            .legend(Legend::default())
            .x_axis_label("Wavelength (nm)")
            .y_axis_label("Intensity (counts)");
        if tighten {
            plot = plot.reset();
        }
        plot.show(&mut cols[0], |plot_ui| {
            refit(plot_ui, rescale);
            measured(plot_ui, "Measured", &frame.grid, &frame.spec, colors.measured);
            plot_ui.line(
                Line::new(xy(&frame.grid, &frame.fit))
                    .name("Fit")
                    .color(colors.fitted)
                    .width(1.5),
            );
        });

        // ---- Residual ----
        let mut plot = Plot::new("residual_plot")
            .height(height)
            .x_axis_label("Wavelength (nm)")
            .y_axis_label("Residual (%)");
        if tighten {
            plot = plot.reset();
        }
        plot.show(&mut cols[0], |plot_ui| {
            refit(plot_ui, rescale);
            measured(plot_ui, "Residual", &frame.grid, &frame.resid, colors.measured);
        });

        // ---- Optical depth of the selected species ----
        let mut plot = Plot::new("od_plot")
            .height(height)
            .legend(Legend::default())
            .x_axis_label("Wavelength (nm)")
            .y_axis_label(format!("{} optical depth", state.species));
        if tighten {
            plot = plot.reset();
        }
        plot.show(&mut cols[1], |plot_ui| {
            refit(plot_ui, rescale);
            if !frame.meas_od.is_empty() {
                measured(plot_ui, "Measured", &frame.grid, &frame.meas_od, colors.measured);
                plot_ui.line(
                    Line::new(xy(&frame.grid, &frame.synth_od))
                        .name("Fit")
                        .color(colors.fitted)
                        .width(1.5),
                );
            }
        });

        // ---- Time series of the selected parameter ----
        let mut plot = Plot::new("series_plot")
            .height(height)
            .x_axis_label("Spectrum number")
            .y_axis_label(state.series_name.as_str());
        if tighten {
            plot = plot.reset();
        }
        plot.show(&mut cols[1], |plot_ui| {
            refit(plot_ui, rescale);
            let points: PlotPoints = state.series.iter().copied().collect();
            plot_ui.line(Line::new(points).color(colors.series).width(1.0));
            let markers: PlotPoints = state.series.iter().copied().collect();
            plot_ui.points(
                Points::new(markers)
                    .shape(MarkerShape::Circle)
                    .radius(2.5)
                    .color(colors.series),
            );
        });
    });

    state.rescale = false;
    state.tighten = false;
}

/// Re-fit the axes to the data when a new frame arrived.
fn refit(plot_ui: &mut PlotUi, rescale: bool) {
    if rescale {
        plot_ui.set_auto_bounds(true);
    }
}

/// Data drawn as crosses joined by a thin line.
fn measured(plot_ui: &mut PlotUi, name: &str, x: &[f64], y: &[f64], color: Color32) {
    plot_ui.line(Line::new(xy(x, y)).name(name).color(color).width(1.0));
    plot_ui.points(
        Points::new(xy(x, y))
            .name(name)
            .shape(MarkerShape::Cross)
            .radius(2.0)
            .color(color),
    );
}

fn xy(x: &[f64], y: &[f64]) -> Vec<[f64; 2]> {
    x.iter().zip(y).map(|(&xi, &yi)| [xi, yi]).collect()
}
