//! Analysis layer: the fit contract consumed by the batch driver.
//!
//! ```text
//!   Spectrum ──┐
//!              ├──► Analyser::fit ──► FitResult
//!  Parameters ─┘          ▲
//!                         │
//!                    FitOptions (interp_method, calc_od)
//! ```
//!
//! The driver only depends on the [`Analyser`] trait; [`linear`] ships a
//! simple log-space DOAS implementation of it.

use std::collections::{BTreeMap, BTreeSet};

pub mod interp;
pub mod linear;

pub use interp::InterpMethod;

use crate::data::model::Spectrum;
use crate::error::{AnalysisError, SetupError};
use crate::params::Parameters;

// ---------------------------------------------------------------------------
// Fit options
// ---------------------------------------------------------------------------

/// Per-call options passed to [`Analyser::fit`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitOptions {
    /// Seed the next fit with this fit's output.
    pub update_params: bool,
    pub interp_method: InterpMethod,
    /// Species whose optical depth curves are returned.
    pub calc_od: BTreeSet<String>,
}

impl FitOptions {
    pub fn new(update_params: bool, interp_method: InterpMethod) -> Self {
        FitOptions {
            update_params,
            interp_method,
            calc_od: BTreeSet::new(),
        }
    }

    pub fn with_calc_od<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.calc_od = names.into_iter().map(Into::into).collect();
        self
    }

    /// Every `calc_od` name must be a species parameter of `params`.
    pub fn validate(&self, params: &Parameters) -> Result<(), SetupError> {
        for name in &self.calc_od {
            match params.get(name) {
                None => return Err(SetupError::UnknownParameter(name.clone())),
                Some(p) if !p.is_species() => return Err(SetupError::NotASpecies(name.clone())),
                Some(_) => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fit result
// ---------------------------------------------------------------------------

/// Everything one fit produces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitResult {
    /// Axis values inside the fit window.
    pub grid: Vec<f64>,
    pub spec: Vec<f64>,
    pub fit: Vec<f64>,
    /// Percentage residual, `(spec - fit) / spec * 100`.
    pub resid: Vec<f64>,
    pub meas_od: BTreeMap<String, Vec<f64>>,
    pub synth_od: BTreeMap<String, Vec<f64>>,
    pub fit_values: BTreeMap<String, f64>,
    pub fit_errors: BTreeMap<String, f64>,
    /// 0 for a good fit, nonzero when degraded.
    pub nerr: u32,
    pub int_lo: f64,
    pub int_hi: f64,
    pub int_av: f64,
    pub time: String,
}

impl FitResult {
    pub fn is_degraded(&self) -> bool {
        self.nerr != 0
    }
}

// ---------------------------------------------------------------------------
// Analyser seam
// ---------------------------------------------------------------------------

/// A spectral fitting engine.
pub trait Analyser {
    /// Install the averaged dark spectrum used by every following fit.
    fn set_dark(&mut self, dark: Vec<f64>);

    /// Fit one spectrum.
    ///
    /// Non-convergence is reported through [`FitResult::nerr`], not as an
    /// error; `Err` means no fit values could be produced at all.
    fn fit(
        &mut self,
        spectrum: &Spectrum,
        params: &Parameters,
        options: &FitOptions,
    ) -> Result<FitResult, AnalysisError>;
}

impl<A: Analyser + ?Sized> Analyser for Box<A> {
    fn set_dark(&mut self, dark: Vec<f64>) {
        (**self).set_dark(dark)
    }

    fn fit(
        &mut self,
        spectrum: &Spectrum,
        params: &Parameters,
        options: &FitOptions,
    ) -> Result<FitResult, AnalysisError> {
        (**self).fit(spectrum, params, options)
    }
}
