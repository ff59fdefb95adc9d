use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SpectrumFormat – on-disk layout tag
// ---------------------------------------------------------------------------

/// Layout of measurement and dark spectrum files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumFormat {
    /// `# key: value` header lines followed by two numeric columns.
    #[default]
    IFit,
    /// `{ "time": ..., "x": [...], "y": [...] }`
    Json,
}

impl fmt::Display for SpectrumFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectrumFormat::IFit => write!(f, "ifit"),
            SpectrumFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for SpectrumFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ifit" => Ok(SpectrumFormat::IFit),
            "json" => Ok(SpectrumFormat::Json),
            other => Err(format!("unknown spectrum format '{other}' (expected ifit or json)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one measurement
// ---------------------------------------------------------------------------

/// A single measured spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Wavelength axis (x).
    pub x: Vec<f64>,
    /// Intensity (y) – same length as `x`.
    pub y: Vec<f64>,
    /// Acquisition time as written by the instrument.
    pub time: String,
    /// Remaining header fields, keys lower-cased.
    pub metadata: BTreeMap<String, String>,
}

impl Spectrum {
    pub fn new(x: Vec<f64>, y: Vec<f64>, time: impl Into<String>) -> Self {
        Spectrum {
            x,
            y,
            time: time.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ReferenceSpectrum – absorption cross-section or solar reference
// ---------------------------------------------------------------------------

/// Tabulated reference spectrum, sorted by ascending `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSpectrum {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl ReferenceSpectrum {
    /// Build from unsorted pairs. Values sharing an `x` are averaged so the
    /// axis is strictly increasing.
    pub fn from_pairs(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut x: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut y: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut run = 0usize;
        for (xi, yi) in pairs {
            if x.last() == Some(&xi) {
                run += 1;
                let last = y.len() - 1;
                y[last] += (yi - y[last]) / run as f64;
            } else {
                run = 1;
                x.push(xi);
                y.push(yi);
            }
        }
        ReferenceSpectrum { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("iFit".parse::<SpectrumFormat>(), Ok(SpectrumFormat::IFit));
        assert_eq!("JSON".parse::<SpectrumFormat>(), Ok(SpectrumFormat::Json));
        assert!("parquet".parse::<SpectrumFormat>().is_err());
    }

    #[test]
    fn reference_pairs_are_sorted() {
        let reference = ReferenceSpectrum::from_pairs(vec![(3.0, 30.0), (1.0, 10.0), (2.0, 20.0)]);
        assert_eq!(reference.x, [1.0, 2.0, 3.0]);
        assert_eq!(reference.y, [10.0, 20.0, 30.0]);
    }
}
