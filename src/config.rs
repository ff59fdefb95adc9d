use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::{FitOptions, InterpMethod};
use crate::data::loader::discover;
use crate::data::model::SpectrumFormat;
use crate::error::SetupError;
use crate::params::Parameters;

// ---------------------------------------------------------------------------
// Run file
// ---------------------------------------------------------------------------

/// One entry of the parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub value: f64,
    #[serde(default = "yes")]
    pub vary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<PathBuf>,
}

/// Live monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Species for the optical depth plot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    /// Parameter for the time-series plot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        PlotConfig {
            enabled: true,
            species: None,
            series: None,
        }
    }
}

/// A complete batch run, read from JSON.
///
/// Relative paths are taken relative to the run file's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    #[serde(default = "default_spectrum_prefix")]
    pub spectrum_prefix: String,
    #[serde(default = "default_dark_prefix")]
    pub dark_prefix: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub format: SpectrumFormat,
    pub fit_window: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frs_path: Option<PathBuf>,
    #[serde(default)]
    pub interp_method: InterpMethod,
    #[serde(default)]
    pub calc_od: Vec<String>,
    #[serde(default = "yes")]
    pub update_params: bool,
    #[serde(default)]
    pub plot: PlotConfig,
    pub parameters: Vec<ParamSpec>,
}

fn yes() -> bool {
    true
}

fn default_spectrum_prefix() -> String {
    "spectrum_".to_string()
}

fn default_dark_prefix() -> String {
    "dark".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("iFit_output.csv")
}

impl RunConfig {
    /// Read a run file and anchor its relative paths.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading run file {}", path.display()))?;
        let mut config: RunConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing run file {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Join every relative path onto `base`.
    pub fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.input_dir);
        join(&mut self.output);
        if let Some(frs) = self.frs_path.as_mut() {
            join(frs);
        }
        for spec in &mut self.parameters {
            if let Some(xpath) = spec.xpath.as_mut() {
                join(xpath);
            }
        }
    }

    /// Build the parameter registry, in file order.
    pub fn parameters(&self) -> Result<Parameters, SetupError> {
        let mut params = Parameters::new();
        for spec in &self.parameters {
            params.add(&spec.name, spec.value, spec.vary, spec.xpath.as_deref())?;
        }
        Ok(params)
    }

    /// Fit options; the plotted species always gets optical depth output.
    pub fn fit_options(&self) -> FitOptions {
        let mut calc_od = self.calc_od.clone();
        if self.plot.enabled {
            if let Some(species) = self.plot_species() {
                if !calc_od.contains(&species) {
                    calc_od.push(species);
                }
            }
        }
        FitOptions::new(self.update_params, self.interp_method).with_calc_od(calc_od)
    }

    /// An explicit `plot.series` must name a registry parameter.
    pub fn validate_plot(&self, params: &Parameters) -> Result<(), SetupError> {
        if !self.plot.enabled {
            return Ok(());
        }
        match &self.plot.series {
            Some(name) if params.get(name).is_none() => {
                Err(SetupError::UnknownParameter(name.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Species shown in the optical depth plot.
    pub fn plot_species(&self) -> Option<String> {
        self.plot
            .species
            .clone()
            .or_else(|| self.calc_od.first().cloned())
            .or_else(|| {
                self.parameters
                    .iter()
                    .find(|p| p.xpath.is_some())
                    .map(|p| p.name.clone())
            })
    }

    /// Parameter shown in the time-series plot.
    pub fn plot_series(&self) -> Option<String> {
        self.plot
            .series
            .clone()
            .or_else(|| self.plot_species())
            .or_else(|| self.parameters.first().map(|p| p.name.clone()))
    }

    /// Dark and measurement files, each sorted.
    pub fn inputs(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>), SetupError> {
        if !self.input_dir.is_dir() {
            return Err(SetupError::MissingInputDir(self.input_dir.clone()));
        }
        let list = |prefix: &str| {
            discover(&self.input_dir, prefix)
                .map_err(|_| SetupError::MissingInputDir(self.input_dir.clone()))
        };
        let dark = list(&self.dark_prefix)?;
        let measurements = list(&self.spectrum_prefix)?;
        if measurements.is_empty() {
            return Err(SetupError::NoInputFiles {
                dir: self.input_dir.clone(),
                prefix: self.spectrum_prefix.clone(),
            });
        }
        Ok((dark, measurements))
    }

    /// A run file matching the classic iFit example setup.
    pub fn example() -> Self {
        let species = |name: &str, value: f64, xpath: &str| ParamSpec {
            name: name.to_string(),
            value,
            vary: true,
            xpath: Some(PathBuf::from(xpath)),
        };
        let plain = |name: &str, value: f64| ParamSpec {
            name: name.to_string(),
            value,
            vary: true,
            xpath: None,
        };

        RunConfig {
            input_dir: PathBuf::from("Example"),
            spectrum_prefix: default_spectrum_prefix(),
            dark_prefix: default_dark_prefix(),
            output: default_output(),
            format: SpectrumFormat::IFit,
            fit_window: [310.0, 320.0],
            frs_path: Some(PathBuf::from("Ref/sao2010.txt")),
            interp_method: InterpMethod::Linear,
            calc_od: vec!["SO2".to_string()],
            update_params: true,
            plot: PlotConfig::default(),
            parameters: vec![
                species("SO2", 1.0e16, "Ref/SO2_295K.txt"),
                species("O3", 1.0e19, "Ref/O3_243K.txt"),
                species("Ring", 0.1, "Ref/Ring.txt"),
                plain("bg_poly0", 0.0),
                plain("bg_poly1", 0.0),
                plain("bg_poly2", 0.0),
                plain("bg_poly3", 1.0),
                plain("offset0", 0.0),
                plain("shift0", 0.0),
                plain("shift1", 0.1),
                plain("fwem", 0.6),
                plain("k", 2.0),
                plain("a_w", 0.0),
                plain("a_k", 0.0),
            ],
        }
    }
}
