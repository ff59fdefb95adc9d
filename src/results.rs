use std::path::Path;

use crate::analysis::FitResult;
use crate::error::PersistenceError;
use crate::params::Parameters;

// ---------------------------------------------------------------------------
// ResultRow – one processed spectrum
// ---------------------------------------------------------------------------

/// A row of the result table. `None` cells are written empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub index: usize,
    pub time: Option<String>,
    /// `(value, error)` per column parameter, in schema order.
    pub values: Vec<(Option<f64>, Option<f64>)>,
    pub fit_quality: Option<u32>,
    pub int_lo: Option<f64>,
    pub int_hi: Option<f64>,
    pub int_av: Option<f64>,
}

/// `fit_quality` of a row whose fit produced no values at all.
pub const FIT_FAILED: u32 = 2;

impl ResultRow {
    /// Whether the row came from a fit, degraded or not.
    pub fn is_fitted(&self) -> bool {
        matches!(self.fit_quality, Some(q) if q != FIT_FAILED)
    }
}

// ---------------------------------------------------------------------------
// ResultTable – append-only, fixed schema
// ---------------------------------------------------------------------------

/// Append-only table with one row per input spectrum.
///
/// The parameter columns are captured from the registry once, at
/// construction, and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(params: &Parameters) -> Self {
        ResultTable {
            columns: params.names().map(str::to_string).collect(),
            rows: Vec::new(),
        }
    }

    /// Parameter names, in column order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Full header: `Number, Time, <p>, <p>_err, ..., fit_quality, int_lo, int_hi, int_av`.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["Number".to_string(), "Time".to_string()];
        for name in &self.columns {
            header.push(name.clone());
            header.push(format!("{name}_err"));
        }
        header.extend(["fit_quality", "int_lo", "int_hi", "int_av"].map(String::from));
        header
    }

    /// Append a row built from a fit. Parameters the fit did not report stay empty.
    pub fn push_fit(&mut self, index: usize, fit: &FitResult) -> &ResultRow {
        let values = self
            .columns
            .iter()
            .map(|name| {
                (
                    fit.fit_values.get(name).copied(),
                    fit.fit_errors.get(name).copied(),
                )
            })
            .collect();
        self.push(ResultRow {
            index,
            time: Some(fit.time.clone()),
            values,
            fit_quality: Some(fit.nerr),
            int_lo: Some(fit.int_lo),
            int_hi: Some(fit.int_hi),
            int_av: Some(fit.int_av),
        })
    }

    /// Append a row for a spectrum that produced no fit.
    pub fn push_unfitted(&mut self, index: usize, time: Option<String>) -> &ResultRow {
        let values = vec![(None, None); self.columns.len()];
        self.push(ResultRow {
            index,
            time,
            values,
            fit_quality: None,
            int_lo: None,
            int_hi: None,
            int_av: None,
        })
    }

    /// Append a row for a spectrum the analyser could not fit. Only the
    /// time and the [`FIT_FAILED`] flag are written.
    pub fn push_failed(&mut self, index: usize, time: String) -> &ResultRow {
        let values = vec![(None, None); self.columns.len()];
        self.push(ResultRow {
            index,
            time: Some(time),
            values,
            fit_quality: Some(FIT_FAILED),
            int_lo: None,
            int_hi: None,
            int_av: None,
        })
    }

    fn push(&mut self, row: ResultRow) -> &ResultRow {
        self.rows.push(row);
        &self.rows[self.rows.len() - 1]
    }

    /// `(index, value)` of one parameter over every fitted row.
    pub fn series(&self, name: &str) -> Vec<[f64; 2]> {
        let Some(col) = self.columns.iter().position(|c| c == name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.values[col].0.map(|v| [row.index as f64, v]))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the table as CSV, replacing any existing file.
    pub fn write_csv(&self, path: &Path) -> Result<(), PersistenceError> {
        let csv_err = |source: csv::Error| PersistenceError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer.write_record(self.header()).map_err(csv_err)?;
        for row in &self.rows {
            writer.write_record(record(row)).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn record(row: &ResultRow) -> Vec<String> {
    let mut out = Vec::with_capacity(2 + 2 * row.values.len() + 4);
    out.push(row.index.to_string());
    out.push(row.time.clone().unwrap_or_default());
    for (value, error) in &row.values {
        out.push(cell(*value));
        out.push(cell(*error));
    }
    out.push(row.fit_quality.map(|q| q.to_string()).unwrap_or_default());
    out.push(cell(row.int_lo));
    out.push(cell(row.int_hi));
    out.push(cell(row.int_av));
    out
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
