//! # Detector Cuts Core Library
//!
//! Frequency-domain scoring of the detectors of a multi-channel time-ordered
//! data array. Every detector is scored by how well it follows the common
//! mode of the array over a set of low-frequency windows, and characterized
//! by its noise in higher bands and by an atmospheric power-law fit. The
//! outputs feed an external cut decision.
//!
//! ## Signal Flow
//!
//! ```text
//! time streams → detrend → FFT → Spectrum
//!   Spectrum → bands → [deproject common modes] → correlation / gain per band → votes
//!   Spectrum → high-frequency rms / skew / kurtosis
//!   Spectrum → power-law fit (exponent, level, knee)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use todcuts_core::prelude::*;
//!
//! let data: Vec<Vec<f64>> = vec![vec![0.0; 4000]; 32];
//! let spectrum = Spectrum::transform(&data, 0.0025).unwrap();
//!
//! let config = CutsConfig::from_json(r#"{"numWindows": 10, "removeDark": true}"#).unwrap();
//! let detectors = DetectorArray::new(vec![true; 32], vec![false; 32]);
//! let input = ObservationInput {
//!     spectrum: &spectrum,
//!     detectors: &detectors,
//!     scan: ScanParams { scan_freq: 0.1, segments: None },
//!     thermometry: None,
//! };
//! let report = analyze(&input, &config).unwrap();
//! println!("{} detectors selected", report.num_selected());
//! ```

pub mod analysis;
pub mod atm;
pub mod bands;
pub mod common_mode;
pub mod config;
pub mod correlation;
pub mod drift;
pub mod fft_utils;
pub mod high_freq;
pub mod observe;
pub mod presel;
pub mod spectral;
pub mod thermal;
pub mod types;
pub mod voting;

// Batch analysis (requires `parallel` feature)
#[cfg(feature = "parallel")]
pub mod parallel;

pub use analysis::{analyze, DetectorArray, DetectorReport, ObservationInput, ObservationReport, ScanParams};
pub use bands::{FrequencyBand, FrequencyRange};
pub use config::CutsConfig;
pub use correlation::{score_band, BandInput, BandScore, ScoringConfig};
pub use spectral::Spectrum;
pub use types::{Complex, ComplexMatrix, CutsError, CutsResult, Mask};
pub use voting::{aggregate_votes, VoteSummary};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::analysis::{analyze, DetectorArray, ObservationInput, ObservationReport, ScanParams};
    pub use crate::atm::{fit_atmosphere, AtmFitConfig, AtmosphereModel};
    pub use crate::bands::{FrequencyBand, FrequencyRange};
    pub use crate::common_mode::{extract_common_modes, CommonModeOptions, CommonModes, ModeSelection};
    pub use crate::config::CutsConfig;
    pub use crate::correlation::{score_band, BandInput, BandScore, ScoringConfig};
    pub use crate::high_freq::{high_freq_stats, HighFreqOptions, NoiseStats};
    pub use crate::spectral::Spectrum;
    pub use crate::types::{Complex, CutsError, CutsResult};
    pub use crate::voting::{aggregate_votes, VoteSummary};
}
