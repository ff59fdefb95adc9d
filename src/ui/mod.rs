/// UI layer of the fit monitor window.
pub mod panels;
pub mod plot;
