use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::model::{ReferenceSpectrum, Spectrum, SpectrumFormat};
use crate::error::SpectrumReadError;

// ---------------------------------------------------------------------------
// Loader seam
// ---------------------------------------------------------------------------

/// Source of measurement and dark spectra.
pub trait SpectrumLoader {
    /// Read one spectrum. Errors are per file and never abort a batch.
    fn load(&self, path: &Path) -> Result<Spectrum, SpectrumReadError>;

    /// Average the intensity of several spectra sharing one axis.
    ///
    /// Unreadable files are skipped with a warning; only a set with no
    /// readable member (or mismatched axis lengths) is an error.
    fn average(&self, paths: &[PathBuf]) -> Result<(Vec<f64>, Vec<f64>), SpectrumReadError> {
        let mut axis: Option<Vec<f64>> = None;
        let mut sum: Vec<f64> = Vec::new();
        let mut count = 0usize;

        for path in paths {
            let spectrum = match self.load(path) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("Skipping spectrum in average: {e}");
                    continue;
                }
            };
            match &axis {
                None => {
                    sum = spectrum.y.clone();
                    axis = Some(spectrum.x);
                }
                Some(x) => {
                    if x.len() != spectrum.y.len() {
                        return Err(SpectrumReadError::AxisMismatch {
                            expected: x.len(),
                            found: spectrum.y.len(),
                        });
                    }
                    for (acc, v) in sum.iter_mut().zip(&spectrum.y) {
                        *acc += v;
                    }
                }
            }
            count += 1;
        }

        let axis = axis.ok_or(SpectrumReadError::NothingToAverage(paths.len()))?;
        let n = count as f64;
        Ok((axis, sum.into_iter().map(|v| v / n).collect()))
    }
}

/// Reads spectra from disk in a fixed [`SpectrumFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader {
    pub format: SpectrumFormat,
}

impl FileLoader {
    pub fn new(format: SpectrumFormat) -> Self {
        FileLoader { format }
    }
}

impl SpectrumLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<Spectrum, SpectrumReadError> {
        read_spectrum(path, self.format)
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a spectrum file in the given format.
pub fn read_spectrum(path: &Path, format: SpectrumFormat) -> Result<Spectrum, SpectrumReadError> {
    let text = std::fs::read_to_string(path).map_err(|source| SpectrumReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let spectrum = match format {
        SpectrumFormat::IFit => parse_ifit(path, &text)?,
        SpectrumFormat::Json => parse_json(path, &text)?,
    };

    if spectrum.x.len() != spectrum.y.len() {
        return Err(SpectrumReadError::LengthMismatch {
            path: path.to_path_buf(),
            x: spectrum.x.len(),
            y: spectrum.y.len(),
        });
    }
    if spectrum.is_empty() {
        return Err(SpectrumReadError::Empty(path.to_path_buf()));
    }
    Ok(spectrum)
}

/// Read a two-column reference spectrum (cross-section or solar atlas).
///
/// Every value must be finite. Repeated wavelengths are averaged.
pub fn read_reference(path: &Path) -> Result<ReferenceSpectrum, SpectrumReadError> {
    let text = std::fs::read_to_string(path).map_err(|source| SpectrumReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut pairs = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (x, y) = parse_pair(path, line_no + 1, line)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(SpectrumReadError::Parse {
                path: path.to_path_buf(),
                line: line_no + 1,
                reason: "non-finite value in reference".to_string(),
            });
        }
        pairs.push((x, y));
    }
    if pairs.is_empty() {
        return Err(SpectrumReadError::Empty(path.to_path_buf()));
    }
    Ok(ReferenceSpectrum::from_pairs(pairs))
}

/// List files in `dir` whose name starts with `prefix`, sorted by path.
pub fn discover(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort_by_key(|p| p.to_string_lossy().replace('\\', "/"));
    Ok(files)
}

// ---------------------------------------------------------------------------
// iFit text format
// ---------------------------------------------------------------------------

/// Layout:
///
/// ```text
/// # Date: 2024-03-01
/// # Time: 12:00:01.250
/// # Integration time (ms): 100
/// 300.012 1523.0
/// 300.105 1530.5
/// ```
fn parse_ifit(path: &Path, text: &str) -> Result<Spectrum, SpectrumReadError> {
    let mut metadata = BTreeMap::new();
    let mut x = Vec::new();
    let mut y = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            if let Some((key, value)) = header.split_once(':') {
                metadata.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
            continue;
        }
        let (xi, yi) = parse_pair(path, line_no + 1, line)?;
        x.push(xi);
        y.push(yi);
    }

    let time = take_timestamp(path, &mut metadata)?;
    Ok(Spectrum { x, y, time, metadata })
}

fn parse_pair(path: &Path, line: usize, text: &str) -> Result<(f64, f64), SpectrumReadError> {
    let mut tokens = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty());

    let mut next = |col: &str| -> Result<f64, SpectrumReadError> {
        let tok = tokens.next().ok_or_else(|| SpectrumReadError::Parse {
            path: path.to_path_buf(),
            line,
            reason: format!("missing {col} column"),
        })?;
        tok.parse::<f64>().map_err(|_| SpectrumReadError::Parse {
            path: path.to_path_buf(),
            line,
            reason: format!("'{tok}' is not a number"),
        })
    };

    let x = next("axis")?;
    let y = next("intensity")?;
    Ok((x, y))
}

fn take_timestamp(
    path: &Path,
    metadata: &mut BTreeMap<String, String>,
) -> Result<String, SpectrumReadError> {
    let time = metadata
        .remove("time")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SpectrumReadError::MissingTime(path.to_path_buf()))?;
    Ok(match metadata.get("date") {
        Some(date) if !date.is_empty() => format!("{date} {time}"),
        _ => time,
    })
}

// ---------------------------------------------------------------------------
// JSON format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonSpectrum {
    x: Vec<f64>,
    y: Vec<f64>,
    #[serde(flatten)]
    extra: BTreeMap<String, JsonValue>,
}

/// Expected schema:
///
/// ```json
/// { "time": "12:00:01", "x": [300.0, 300.1], "y": [1523.0, 1530.5], "coadds": 10 }
/// ```
fn parse_json(path: &Path, text: &str) -> Result<Spectrum, SpectrumReadError> {
    let raw: JsonSpectrum = serde_json::from_str(text).map_err(|e| SpectrumReadError::Json {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut metadata: BTreeMap<String, String> = raw
        .extra
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::String(s) => s,
                other => other.to_string(),
            };
            (key.to_ascii_lowercase(), value)
        })
        .collect();

    let time = take_timestamp(path, &mut metadata)?;
    Ok(Spectrum {
        x: raw.x,
        y: raw.y,
        time,
        metadata,
    })
}
