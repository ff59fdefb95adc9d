/// Data layer: spectrum types and file loading.
///
/// Architecture:
/// ```text
///  dark_* / spectrum_*        Ref/*.txt
///        │                        │
///        ▼                        ▼
///   ┌──────────┐           ┌────────────────┐
///   │  loader   │           │ read_reference │
///   └──────────┘           └────────────────┘
///        │                        │
///        ▼                        ▼
///   ┌──────────┐           ┌──────────────────┐
///   │ Spectrum  │           │ ReferenceSpectrum │
///   └──────────┘           └──────────────────┘
/// ```

pub mod loader;
pub mod model;
