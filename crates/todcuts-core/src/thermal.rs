//! Cryostat thermometry
//!
//! Housekeeping thermometers serve two purposes: their band-limited spectra
//! join the dark detectors as common-mode references, and their mean and
//! drift flag observations taken while the focal plane was too warm or
//! drifting.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bands::FrequencyBand;
use crate::fft_utils::{FftProcessor, Trend};
use crate::types::{Complex, ComplexMatrix, CutsError, CutsResult};

/// A channel that never changes carries no information.
fn is_constant(channel: &[f64]) -> bool {
    channel.windows(2).all(|p| p[0] == p[1])
}

/// Detrended spectra of the non-constant `channels`, transformed at the
/// run's length `nf` and sliced to `band`. The result may have zero rows.
pub fn thermometry_spectra(channels: &[Vec<f64>], band: &FrequencyBand, nf: usize) -> CutsResult<ComplexMatrix> {
    let nbins = nf / 2 + 1;
    if band.high > nbins || band.is_empty() {
        return Err(CutsError::BandOutOfRange {
            low: band.low,
            high: band.high,
            bins: nbins,
        });
    }

    let mut fft = FftProcessor::new(nf);
    let mut rows: Vec<Vec<Complex>> = Vec::new();
    for channel in channels.iter().filter(|c| !is_constant(c)) {
        let mut buffer = channel.clone();
        Trend::remove(&mut buffer);
        let spectrum = fft.forward_real(&buffer);
        rows.push(spectrum[band.low..band.high].to_vec());
    }
    debug!(
        channels = channels.len(),
        used = rows.len(),
        "Transformed thermometry channels"
    );
    Ok(DMatrix::from_fn(rows.len(), band.len(), |r, c| rows[r][c]))
}

/// Limits above which an observation is flagged as thermally unstable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalLimits {
    /// Maximum mean temperature.
    #[serde(alias = "T_max")]
    pub t_max: f64,
    /// Maximum absolute temperature drift over the observation.
    #[serde(alias = "dT_max")]
    pub dt_max: f64,
}

/// Temperature statistics of the first usable thermometer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermalSummary {
    pub mean: f64,
    /// End minus start of the fitted linear trend.
    pub drift: f64,
    pub cut: bool,
}

/// Summarize the first non-constant channel; `None` if every channel is
/// constant or empty.
pub fn summarize_thermometry(channels: &[Vec<f64>], limits: &ThermalLimits) -> Option<ThermalSummary> {
    let channel = channels.iter().find(|c| c.len() > 1 && !is_constant(c))?;
    let mean = channel.iter().sum::<f64>() / channel.len() as f64;
    let trend = Trend::fit(channel);
    let drift = trend.end - trend.start;
    let cut = mean > limits.t_max || drift.abs() > limits.dt_max;
    let summary = ThermalSummary { mean, drift, cut };
    info!(mean, drift, cut, "Thermometry summary");
    Some(summary)
}
