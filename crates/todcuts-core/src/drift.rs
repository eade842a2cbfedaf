//! Slow common mode
//!
//! The array-average drift below `driftFilter` Hz, reconstructed in the time
//! domain and re-trended with the mean linear trend the front end removed
//! from the same detectors.

use nalgebra::DMatrix;
use serde::Serialize;
use tracing::debug;

use crate::bands::FrequencyBand;
use crate::fft_utils::{next_regular, Trend};
use crate::spectral::{time_domain_modes, Spectrum};
use crate::types::{check_len, mask_indices, Complex, CutsError, CutsResult};

/// Mean low-frequency waveform of a detector subset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowMode {
    pub band: FrequencyBand,
    /// Re-trended waveform.
    pub waveform: Vec<f64>,
    /// Sample interval of `waveform`.
    pub sample_interval: f64,
    /// Mean trend of the contributing detectors, already added back.
    pub trend: Trend,
}

/// Drift band `[1, nextRegular(round(drift_filter/df)) + 1)`, clipped to the
/// spectrum.
pub fn drift_band(spectrum: &Spectrum, drift_filter: f64) -> CutsResult<FrequencyBand> {
    if !(drift_filter > 0.0) {
        return Err(CutsError::Configuration(format!(
            "drift filter must be positive, got {}",
            drift_filter
        )));
    }
    let high = (next_regular((drift_filter / spectrum.df()).round() as usize) + 1).min(spectrum.num_bins());
    FrequencyBand::new(1, high)
}

/// Average the `presel` rows over the drift band and bring the mean back to
/// the time domain.
pub fn slow_common_mode(spectrum: &Spectrum, presel: &[bool], drift_filter: f64) -> CutsResult<SlowMode> {
    check_len("preselection", spectrum.num_detectors(), presel.len())?;
    let rows = mask_indices(presel);
    if rows.is_empty() {
        return Err(CutsError::DegenerateInput(
            "slow common mode needs at least one preselected detector".into(),
        ));
    }
    let band = drift_band(spectrum, drift_filter)?;
    let block = spectrum.slice(&rows, &band)?;
    let scale = Complex::new(1.0 / rows.len() as f64, 0.0);
    let mean = DMatrix::from_fn(1, block.ncols(), |_, k| block.column(k).sum() * scale);

    let time = time_domain_modes(&mean, band.low, spectrum.df());
    let mut waveform = time.waveforms.into_iter().next().unwrap_or_default();
    let trend = Trend::mean(rows.iter().map(|&d| &spectrum.trends()[d]));
    trend.restore(&mut waveform);

    debug!(
        detectors = rows.len(),
        bins = band.len(),
        samples = waveform.len(),
        "Built slow common mode"
    );
    Ok(SlowMode {
        band,
        waveform,
        sample_interval: time.sample_interval,
        trend,
    })
}
