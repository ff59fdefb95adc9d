use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::{DMatrix, DVector};

use super::interp::resample;
use super::{Analyser, FitOptions, FitResult};
use crate::data::loader::read_reference;
use crate::data::model::{ReferenceSpectrum, Spectrum};
use crate::error::{AnalysisError, SetupError};
use crate::params::Parameters;

/// Prefix of the background polynomial coefficients.
pub const BG_POLY_PREFIX: &str = "bg_poly";

/// `nerr` value of a degraded fit.
const DEGRADED: u32 = 1;

// ---------------------------------------------------------------------------
// LinearAnalyser
// ---------------------------------------------------------------------------

/// Log-space DOAS fit solved by linear least squares.
///
/// Over the fit window the model is
///
/// ```text
/// ln(I - dark) = ln(FRS) + P(t) - Σ c_j σ_j(x)
/// ```
///
/// where `t` maps the window onto `[-1, 1]`, `P` takes one coefficient per
/// `bg_poly*` parameter (first is the highest power) and `σ_j` is species
/// `j`'s cross-section. Parameters that enter non-linearly (offsets, shift,
/// line shape) are held at their seed.
#[derive(Debug, Clone)]
pub struct LinearAnalyser {
    fit_window: (f64, f64),
    frs: Option<ReferenceSpectrum>,
    xsecs: BTreeMap<String, ReferenceSpectrum>,
    dark: Option<Vec<f64>>,
}

/// One unknown of the linear system.
struct Term {
    name: String,
    column: Vec<f64>,
    seed: f64,
    vary: bool,
}

impl LinearAnalyser {
    /// Load the solar reference and every species cross-section in `params`.
    pub fn new(
        params: &Parameters,
        fit_window: [f64; 2],
        frs_path: Option<&Path>,
    ) -> Result<Self, SetupError> {
        let frs = frs_path
            .map(|path| load_reference("frs", path))
            .transpose()?;

        let mut xsecs = BTreeMap::new();
        for species in params.species() {
            if let Some(path) = &species.xpath {
                xsecs.insert(species.name.clone(), load_reference(&species.name, path)?);
            }
        }
        Self::from_references(fit_window, frs, xsecs)
    }

    /// Build from references already in memory.
    pub fn from_references(
        fit_window: [f64; 2],
        frs: Option<ReferenceSpectrum>,
        xsecs: BTreeMap<String, ReferenceSpectrum>,
    ) -> Result<Self, SetupError> {
        let [lo, hi] = fit_window;
        if !(lo < hi) {
            return Err(SetupError::InvalidFitWindow { lo, hi });
        }
        Ok(LinearAnalyser {
            fit_window: (lo, hi),
            frs,
            xsecs,
            dark: None,
        })
    }

    pub fn fit_window(&self) -> (f64, f64) {
        self.fit_window
    }
}

fn load_reference(name: &str, path: &Path) -> Result<ReferenceSpectrum, SetupError> {
    if !path.exists() {
        return Err(SetupError::MissingReference {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }
    read_reference(path).map_err(|e| SetupError::BadReference {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl Analyser for LinearAnalyser {
    fn set_dark(&mut self, dark: Vec<f64>) {
        self.dark = Some(dark);
    }

    fn fit(
        &mut self,
        spectrum: &Spectrum,
        params: &Parameters,
        options: &FitOptions,
    ) -> Result<FitResult, AnalysisError> {
        if let Some(dark) = &self.dark {
            if dark.len() != spectrum.len() {
                return Err(AnalysisError::DarkMismatch {
                    dark: dark.len(),
                    spectrum: spectrum.len(),
                });
            }
        }
        if let Some(name) = options.calc_od.iter().find(|n| !self.xsecs.contains_key(*n)) {
            return Err(AnalysisError::NotASpecies(name.clone()));
        }

        // ---- Fit window ----
        let (lo, hi) = self.fit_window;
        let window: Vec<usize> = (0..spectrum.len())
            .filter(|&i| spectrum.x[i] >= lo && spectrum.x[i] <= hi)
            .collect();
        if window.is_empty() {
            return Err(AnalysisError::EmptyWindow { lo, hi });
        }

        let grid: Vec<f64> = window.iter().map(|&i| spectrum.x[i]).collect();
        let spec: Vec<f64> = window
            .iter()
            .map(|&i| spectrum.y[i] - self.dark.as_ref().map_or(0.0, |d| d[i]))
            .collect();

        let int_lo = spec.iter().copied().fold(f64::INFINITY, f64::min);
        let int_hi = spec.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let int_av = spec.iter().sum::<f64>() / spec.len() as f64;

        // ---- Model terms ----
        let ln_frs: Vec<f64> = match &self.frs {
            Some(frs) => resample(&frs.x, &frs.y, &grid, options.interp_method)
                .into_iter()
                .map(f64::ln)
                .collect(),
            None => vec![0.0; grid.len()],
        };

        let mid = 0.5 * (lo + hi);
        let half = 0.5 * (hi - lo);
        let t: Vec<f64> = grid.iter().map(|x| (x - mid) / half).collect();

        let n_poly = params
            .names()
            .filter(|n| n.starts_with(BG_POLY_PREFIX))
            .count();
        let mut xsec_on_grid: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut terms: Vec<Term> = Vec::new();
        let mut poly_seen = 0;

        for p in params {
            if let Some(xsec) = self.xsecs.get(&p.name) {
                let sigma = resample(&xsec.x, &xsec.y, &grid, options.interp_method);
                terms.push(Term {
                    name: p.name.clone(),
                    column: sigma.iter().map(|s| -s).collect(),
                    seed: p.value,
                    vary: p.vary,
                });
                xsec_on_grid.insert(p.name.as_str(), sigma);
            } else if p.name.starts_with(BG_POLY_PREFIX) {
                let power = (n_poly - 1 - poly_seen) as i32;
                poly_seen += 1;
                terms.push(Term {
                    name: p.name.clone(),
                    column: t.iter().map(|ti| ti.powi(power)).collect(),
                    seed: p.value,
                    vary: p.vary,
                });
            }
        }

        // Fixed terms and the solar reference form the offset of the system.
        let base: Vec<f64> = (0..grid.len())
            .map(|i| {
                ln_frs[i]
                    + terms
                        .iter()
                        .filter(|term| !term.vary)
                        .map(|term| term.seed * term.column[i])
                        .sum::<f64>()
            })
            .collect();

        let ln_spec: Vec<f64> = spec.iter().map(|v| v.ln()).collect();
        let usable: Vec<usize> = (0..grid.len())
            .filter(|&i| ln_spec[i].is_finite() && base[i].is_finite())
            .collect();

        let free: Vec<&Term> = terms.iter().filter(|term| term.vary).collect();
        let solution = solve(&free, &usable, &ln_spec, &base);
        let nerr = if solution.is_some() { 0 } else { DEGRADED };
        if nerr != 0 {
            log::debug!(
                "Linear fit degraded: {} usable points for {} free terms",
                usable.len(),
                free.len()
            );
        }

        // ---- Fit values ----
        let mut fit_values = BTreeMap::new();
        let mut fit_errors = BTreeMap::new();
        let solved: BTreeMap<&str, (f64, f64)> = match &solution {
            Some((coefs, errs)) => free
                .iter()
                .zip(coefs.iter().zip(errs))
                .map(|(term, (&c, &e))| (term.name.as_str(), (c, e)))
                .collect(),
            None => free
                .iter()
                .map(|term| (term.name.as_str(), (term.seed, f64::NAN)))
                .collect(),
        };
        for p in params {
            let (value, error) = solved.get(p.name.as_str()).copied().unwrap_or((p.value, 0.0));
            fit_values.insert(p.name.clone(), value);
            fit_errors.insert(p.name.clone(), error);
        }

        // ---- Model curves ----
        let model: Vec<f64> = (0..grid.len())
            .map(|i| {
                ln_frs[i]
                    + terms
                        .iter()
                        .map(|term| fit_values[&term.name] * term.column[i])
                        .sum::<f64>()
            })
            .collect();
        let fit: Vec<f64> = model.iter().map(|m| m.exp()).collect();
        let resid: Vec<f64> = spec
            .iter()
            .zip(&fit)
            .map(|(s, f)| (s - f) / s * 100.0)
            .collect();

        let mut meas_od = BTreeMap::new();
        let mut synth_od = BTreeMap::new();
        for name in &options.calc_od {
            let Some(sigma) = xsec_on_grid.get(name.as_str()) else {
                continue;
            };
            let amount = fit_values[name];
            let synth: Vec<f64> = sigma.iter().map(|s| amount * s).collect();
            let meas: Vec<f64> = (0..grid.len())
                .map(|i| model[i] + synth[i] - ln_spec[i])
                .collect();
            meas_od.insert(name.clone(), meas);
            synth_od.insert(name.clone(), synth);
        }

        Ok(FitResult {
            grid,
            spec,
            fit,
            resid,
            meas_od,
            synth_od,
            fit_values,
            fit_errors,
            nerr,
            int_lo,
            int_hi,
            int_av,
            time: spectrum.time.clone(),
        })
    }
}

/// Least-squares solve for the free terms over the usable points.
///
/// Returns coefficients and their 1-sigma errors, or `None` when the system
/// is under-determined or singular.
fn solve(
    free: &[&Term],
    usable: &[usize],
    ln_spec: &[f64],
    base: &[f64],
) -> Option<(Vec<f64>, Vec<f64>)> {
    let p = free.len();
    let n = usable.len();
    if p == 0 {
        return Some((Vec::new(), Vec::new()));
    }
    if n <= p {
        return None;
    }

    // Columns are scaled to unit peak so cross-sections (~1e-19) and
    // polynomial terms (~1) condition alike.
    let scales: Vec<f64> = free
        .iter()
        .map(|term| {
            usable
                .iter()
                .map(|&i| term.column[i].abs())
                .fold(0.0, f64::max)
        })
        .collect();
    if scales.iter().any(|&s| s == 0.0 || !s.is_finite()) {
        return None;
    }

    let a = DMatrix::from_fn(n, p, |r, c| free[c].column[usable[r]] / scales[c]);
    let b = DVector::from_iterator(n, usable.iter().map(|&i| ln_spec[i] - base[i]));
    // The SVD panics on NaN input.
    if !a.iter().chain(b.iter()).all(|v| v.is_finite()) {
        return None;
    }

    let svd = a.clone().svd(true, true);
    let x = svd.solve(&b, 1e-14).ok()?;
    let cov = (a.transpose() * &a).try_inverse()?;

    let resid = &b - &a * &x;
    let s2 = resid.norm_squared() / (n - p) as f64;

    let coefs: Vec<f64> = (0..p).map(|k| x[k] / scales[k]).collect();
    let errs: Vec<f64> = (0..p)
        .map(|k| (cov[(k, k)] * s2).sqrt() / scales[k])
        .collect();

    if coefs.iter().chain(&errs).all(|v| v.is_finite()) {
        Some((coefs, errs))
    } else {
        None
    }
}
