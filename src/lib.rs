//! Batch DOAS fitting: run an analyser over a directory of spectra,
//! collect one result row per spectrum and optionally watch the fits live.
//!
//! ```text
//!  RunConfig ──► Parameters ──► BatchDriver ──► ResultTable ──► CSV
//!                                  │    ▲
//!                       Spectrum ──┘    └── Analyser::fit
//!                                  │
//!                                  ▼
//!                          LiveView ──mpsc──► FitMonitorApp
//! ```

pub mod analysis;
pub mod app;
pub mod color;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod live;
pub mod params;
pub mod results;
pub mod state;
pub mod ui;

pub use analysis::{Analyser, FitOptions, FitResult, InterpMethod};
pub use driver::{BatchDriver, CancelFlag, RunReport};
pub use error::{PipelineError, SetupError};
pub use params::{Parameter, Parameters};
pub use results::ResultTable;
