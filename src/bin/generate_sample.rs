use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use rusty_ifit::analysis::InterpMethod;
use rusty_ifit::config::{ParamSpec, PlotConfig, RunConfig};
use rusty_ifit::data::model::SpectrumFormat;

/// Gaussian band of unit peak height.
fn band(x: f64, centre: f64, width: f64) -> f64 {
    (-0.5 * ((x - centre) / width).powi(2)).exp()
}

/// Banded SO2-like cross-section (cm²/molecule).
fn so2_xsec(wl: f64) -> f64 {
    let bands: f64 = (0..8)
        .map(|i| band(wl, 302.0 + i as f64 * 3.6, 0.9))
        .sum();
    2.0e-19 * (0.2 + bands) * (-(wl - 300.0) / 12.0).exp()
}

/// Solar reference with a handful of Fraunhofer lines.
fn solar(wl: f64) -> f64 {
    let lines: f64 = [303.4, 308.2, 309.9, 313.1, 316.7, 319.4, 324.0]
        .iter()
        .map(|&mu| 0.35 * band(wl, mu, 0.25))
        .sum();
    1.0e4 * (1.0 + 0.02 * (wl - 300.0)) * (1.0 - lines)
}

/// Seeded Gaussian noise (splitmix64 + Box-Muller).
struct Noise(u64);

impl Noise {
    fn uniform(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        ((z ^ (z >> 31)) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn normal(&mut self, sigma: f64) -> f64 {
        let u1 = self.uniform().max(f64::MIN_POSITIVE);
        let u2 = self.uniform();
        sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

fn write_two_columns(path: &Path, header: &str, x: &[f64], y: &[f64]) -> Result<()> {
    let mut text = String::from(header);
    for (xi, yi) in x.iter().zip(y) {
        let _ = writeln!(text, "{xi:.3} {yi:.6e}");
    }
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_run"));
    let spectra_dir = root.join("Example");
    let ref_dir = root.join("Ref");
    fs::create_dir_all(&spectra_dir)?;
    fs::create_dir_all(&ref_dir)?;

    let mut noise = Noise(42);

    // Reference grid: 295 → 335 nm, step 0.02
    let ref_wl: Vec<f64> = (0..2001).map(|i| 295.0 + i as f64 * 0.02).collect();
    let xsec: Vec<f64> = ref_wl.iter().map(|&wl| so2_xsec(wl)).collect();
    let frs: Vec<f64> = ref_wl.iter().map(|&wl| solar(wl)).collect();
    write_two_columns(&ref_dir.join("SO2_295K.txt"), "# SO2 cross-section, 295 K\n", &ref_wl, &xsec)?;
    write_two_columns(&ref_dir.join("sao2010.txt"), "# Solar reference\n", &ref_wl, &frs)?;

    // Instrument grid: 300 → 330 nm, step 0.1
    let wl: Vec<f64> = (0..301).map(|i| 300.0 + i as f64 * 0.1).collect();
    let dark_level = 480.0;

    for i in 0..5 {
        let dark: Vec<f64> = wl.iter().map(|_| dark_level + noise.normal(3.0)).collect();
        let header = format!("# Date: 2024-03-01\n# Time: 11:59:{:02}\n# Dark: true\n", i * 5);
        write_two_columns(&spectra_dir.join(format!("dark_{i:03}.txt")), &header, &wl, &dark)?;
    }

    let n_spectra = 60;
    for i in 0..n_spectra {
        // A plume drifting through the field of view.
        let so2 = 2.0e16 + 3.0e17 * band(i as f64, 30.0, 8.0);
        let y: Vec<f64> = wl
            .iter()
            .map(|&w| {
                let signal = 0.9 * solar(w) * (-so2 * so2_xsec(w)).exp();
                dark_level + signal + noise.normal(0.002 * signal)
            })
            .collect();
        let seconds = 10 * i;
        let header = format!(
            "# Date: 2024-03-01\n# Time: 12:{:02}:{:02}\n# True SO2: {so2:.4e}\n",
            seconds / 60,
            seconds % 60
        );
        write_two_columns(&spectra_dir.join(format!("spectrum_{i:05}.txt")), &header, &wl, &y)?;
    }

    let param = |name: &str, value: f64, xpath: Option<&str>| ParamSpec {
        name: name.to_string(),
        value,
        vary: true,
        xpath: xpath.map(PathBuf::from),
    };
    let config = RunConfig {
        input_dir: PathBuf::from("Example"),
        spectrum_prefix: "spectrum_".to_string(),
        dark_prefix: "dark".to_string(),
        output: PathBuf::from("iFit_output.csv"),
        format: SpectrumFormat::IFit,
        fit_window: [310.0, 320.0],
        frs_path: Some(PathBuf::from("Ref/sao2010.txt")),
        interp_method: InterpMethod::Cubic,
        calc_od: vec!["SO2".to_string()],
        update_params: true,
        plot: PlotConfig::default(),
        parameters: vec![
            param("SO2", 1.0e16, Some("Ref/SO2_295K.txt")),
            param("bg_poly0", 0.0, None),
            param("bg_poly1", 0.0, None),
            param("bg_poly2", 1.0, None),
            param("shift0", 0.0, None),
        ],
    };
    let run_file = root.join("run.json");
    fs::write(&run_file, serde_json::to_string_pretty(&config)?)?;

    println!(
        "Wrote {n_spectra} spectra ({} points each) and 5 dark spectra; run with:\n  rusty-ifit --config {}",
        wl.len(),
        run_file.display()
    );
    Ok(())
}
