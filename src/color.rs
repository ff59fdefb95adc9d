use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Colour palette for the monitor plots
// ---------------------------------------------------------------------------

/// `n` visually distinct colours, hues evenly spaced from `start_hue`.
pub fn generate_palette(n: usize, start_hue: f32) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (start_hue + (i as f32 / n as f32) * 360.0) % 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

/// Line colours shared by the four plots.
#[derive(Debug, Clone, Copy)]
pub struct PlotColors {
    pub measured: Color32,
    pub fitted: Color32,
    pub series: Color32,
}

impl Default for PlotColors {
    fn default() -> Self {
        // Blue measured, magenta model, green series.
        let palette = generate_palette(3, 210.0);
        PlotColors {
            measured: palette[0],
            fitted: palette[1],
            series: palette[2],
        }
    }
}

/// Status colour for a fit quality flag.
pub fn quality_color(nerr: u32) -> Color32 {
    if nerr == 0 {
        Color32::from_rgb(80, 180, 90)
    } else {
        Color32::from_rgb(220, 80, 60)
    }
}
