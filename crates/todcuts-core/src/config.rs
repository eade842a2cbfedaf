//! # Configuration
//!
//! One [`CutsConfig`] drives a full observation analysis. Files are JSON or
//! YAML with camelCase keys; every field has a default, and the legacy names
//! `Nwin`, `Nmodes`, `its`, `DEModes`, `MFEModes`, `HFLiveModes` and
//! `HFDarkModes` are accepted.
//!
//! ## Example Configuration
//!
//! ```yaml
//! fmin: 0.017
//! fshift: 0.009
//! band: 0.070
//! numWindows: 10
//! useTaper: false
//! cancelSync: true
//! presel:
//!   method: groups
//!   minGroupSize: 20
//!   normLimit: [0.01, 1.0e3]
//! removeDark: true
//! darkModes:
//!   useDarks: true
//!   useSVD: true
//!   Nmodes: 1
//! atmFit:
//!   fminA: 0.2
//!   fmaxA: 3.0
//!   its: 2
//! fitPowerLaw: true
//! ```
//!
//! Low-frequency keys sit at the top level; dark detectors reuse them unless
//! a `darkLowFreq` section is given.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::atm::AtmFitConfig;
use crate::bands::FrequencyRange;
use crate::common_mode::{CommonModeOptions, ModeSelection};
use crate::correlation::ScoringConfig;
use crate::thermal::ThermalLimits;
use crate::types::{CutsError, CutsResult};

/// Window layout and scoring options of one low-frequency analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LowFreqConfig {
    #[serde(flatten)]
    pub range: FrequencyRange,
    #[serde(flatten)]
    pub scoring: ScoringConfig,
}

impl LowFreqConfig {
    pub fn validate(&self) -> CutsResult<()> {
        self.range.validate()?;
        let limit = self.scoring.presel.norm_limit;
        if !(limit.min < limit.max) {
            return Err(CutsError::Configuration(format!(
                "norm limit [{}, {}] is empty",
                limit.min, limit.max
            )));
        }
        Ok(())
    }
}

/// Sources of the common modes deprojected from live detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DarkModesConfig {
    /// Use dark detectors as references.
    pub use_darks: bool,
    /// Orthogonalize the references.
    #[serde(rename = "useSVD")]
    pub use_svd: bool,
    /// Modes kept after the SVD; all dominant modes when absent.
    #[serde(alias = "Nmodes")]
    pub num_modes: Option<usize>,
    /// Add thermometer spectra to the references.
    pub use_therm: bool,
}

impl Default for DarkModesConfig {
    fn default() -> Self {
        Self {
            use_darks: true,
            use_svd: false,
            num_modes: None,
            use_therm: false,
        }
    }
}

impl DarkModesConfig {
    pub fn mode_options(&self, taper: bool) -> CommonModeOptions {
        CommonModeOptions {
            taper,
            svd: self
                .use_svd
                .then(|| self.num_modes.map_or(ModeSelection::Dominant, ModeSelection::Fixed)),
        }
    }
}

/// Rms of the slow drift band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriftConfig {
    /// Upper edge of the drift band, Hz.
    pub drift_filter: f64,
    /// Common modes removed before the rms.
    #[serde(alias = "DEModes")]
    pub modes: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            drift_filter: 0.036,
            modes: 3,
        }
    }
}

/// Rms over a mid-frequency band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MidFreqConfig {
    /// Band edges, Hz.
    #[serde(alias = "midFreqFilter")]
    pub filter: [f64; 2],
    #[serde(alias = "MFEModes")]
    pub modes: usize,
}

impl Default for MidFreqConfig {
    fn default() -> Self {
        Self {
            filter: [0.3, 1.0],
            modes: 8,
        }
    }
}

/// High-frequency noise statistics of live and dark detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighFreqConfig {
    /// Band edges, Hz.
    #[serde(alias = "highFreqFilter")]
    pub filter: [f64; 2],
    #[serde(alias = "HFLiveModes")]
    pub live_modes: usize,
    #[serde(alias = "HFDarkModes")]
    pub dark_modes: usize,
    /// Per scan-segment statistics.
    pub get_partial: bool,
}

impl Default for HighFreqConfig {
    fn default() -> Self {
        Self {
            filter: [9.0, 19.0],
            live_modes: 10,
            dark_modes: 3,
            get_partial: false,
        }
    }
}

fn check_filter(name: &str, filter: [f64; 2]) -> CutsResult<()> {
    if !(filter[0] >= 0.0) || !(filter[1] > filter[0]) {
        return Err(CutsError::Configuration(format!(
            "{} band [{}, {}] Hz is empty",
            name, filter[0], filter[1]
        )));
    }
    Ok(())
}

/// Configuration of a full observation analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutsConfig {
    /// Live-detector low-frequency analysis.
    #[serde(flatten)]
    pub low_freq: LowFreqConfig,
    /// Dark-detector low-frequency analysis; `low_freq` when absent.
    #[serde(default)]
    pub dark_low_freq: Option<LowFreqConfig>,
    #[serde(default)]
    pub dark_modes: DarkModesConfig,
    /// Deproject dark modes from live detectors.
    #[serde(default)]
    pub remove_dark: bool,
    /// Score every nominal frequency group separately.
    #[serde(default)]
    pub separate_freqs: bool,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub mid_freq: MidFreqConfig,
    #[serde(default)]
    pub high_freq: HighFreqConfig,
    #[serde(default)]
    pub atm_fit: AtmFitConfig,
    #[serde(default)]
    pub fit_power_law: bool,
    /// Thermal cut limits; no thermal summary without them.
    #[serde(default)]
    pub thermal_limits: Option<ThermalLimits>,
}

impl CutsConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> CutsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML configuration.
    pub fn from_yaml(yaml: &str) -> CutsResult<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| CutsError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.json`, `.yaml` or `.yml` file.
    pub fn load_from(path: &Path) -> CutsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CutsError::Configuration(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            other => Err(CutsError::Configuration(format!(
                "unsupported configuration format {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Low-frequency settings of the dark analysis.
    pub fn dark_low_freq(&self) -> &LowFreqConfig {
        self.dark_low_freq.as_ref().unwrap_or(&self.low_freq)
    }

    pub fn validate(&self) -> CutsResult<()> {
        self.low_freq.validate()?;
        if let Some(dark) = &self.dark_low_freq {
            dark.validate()?;
        }
        if self.fit_power_law {
            self.atm_fit.validate()?;
        }
        if !(self.drift.drift_filter > 0.0) {
            return Err(CutsError::Configuration(format!(
                "drift filter must be positive, got {}",
                self.drift.drift_filter
            )));
        }
        check_filter("mid-frequency", self.mid_freq.filter)?;
        check_filter("high-frequency", self.high_freq.filter)?;
        Ok(())
    }
}
