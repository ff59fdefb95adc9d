use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::SetupError;

// ---------------------------------------------------------------------------
// Parameter – one named fit parameter
// ---------------------------------------------------------------------------

/// A single fit parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// Seed for the next fit. Overwritten between spectra when warm starting.
    pub value: f64,
    /// When false the analyser holds `value` fixed.
    pub vary: bool,
    /// Absorption cross-section file; only species parameters carry one.
    pub xpath: Option<PathBuf>,
}

impl Parameter {
    /// Whether this parameter is an absorbing species.
    pub fn is_species(&self) -> bool {
        self.xpath.is_some()
    }
}

// ---------------------------------------------------------------------------
// Parameters – the ordered registry
// ---------------------------------------------------------------------------

/// Ordered name → parameter registry.
///
/// Insertion order is fixed once built and drives every column layout
/// downstream, so the registry never reorders or drops entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter. Names must be unique.
    pub fn add(
        &mut self,
        name: &str,
        value: f64,
        vary: bool,
        xpath: Option<&Path>,
    ) -> Result<(), SetupError> {
        if self.index.contains_key(name) {
            return Err(SetupError::DuplicateParameter(name.to_string()));
        }
        self.index.insert(name.to_string(), self.params.len());
        self.params.push(Parameter {
            name: name.to_string(),
            value,
            vary,
            xpath: xpath.map(Path::to_path_buf),
        });
        Ok(())
    }

    /// Parameters in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.index.get(name).map(|&i| &self.params[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Species parameters (those with a reference spectrum), in order.
    pub fn species(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| p.is_species())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Overwrite the seed of every parameter named in `fit_values`.
    ///
    /// Names not in the registry are ignored; parameters missing from
    /// `fit_values` keep their current seed.
    pub fn update_from(&mut self, fit_values: &BTreeMap<String, f64>) {
        for (name, &value) in fit_values {
            if let Some(&i) = self.index.get(name) {
                self.params[i].value = value;
            }
        }
    }

    /// Human-readable summary table for diagnostics.
    pub fn render(&self) -> String {
        let name_w = self
            .params
            .iter()
            .map(|p| p.name.len())
            .max()
            .unwrap_or(0)
            .max("Name".len());

        let mut out = String::new();
        let _ = writeln!(out, "{:<name_w$}  {:>12}  {:<5}  Xpath", "Name", "Value", "Vary");
        let _ = writeln!(out, "{}", "-".repeat(name_w + 34));
        for p in &self.params {
            let xpath = p
                .xpath
                .as_ref()
                .map(|x| x.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<name_w$}  {:>12.4e}  {:<5}  {}",
                p.name, p.value, p.vary, xpath
            );
        }
        out
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
