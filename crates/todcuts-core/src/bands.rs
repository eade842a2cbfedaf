//! Frequency sub-bands
//!
//! Low-frequency scoring runs on a set of overlapping windows, each
//! `band` Hz wide and shifted by `fshift` Hz from the previous one:
//!
//! ```text
//!  fmin
//!   │◀──── band ────▶│
//!   ├────────────────┤                      window 0
//!   │fshift│├────────────────┤              window 1
//!          │fshift│├────────────────┤       window 2
//! ```
//!
//! Every window is converted to a half-open bin range and widened to at
//! least `min_bins` bins.
//!
//! ## Example
//!
//! ```rust
//! use todcuts_core::bands::FrequencyRange;
//!
//! let range = FrequencyRange { fmin: 0.017, fshift: 0.009, band: 0.070, num_windows: 3, min_bins: 16 };
//! let bands = range.partition(0.001).unwrap();
//! assert_eq!(bands.len(), 3);
//! assert_eq!((bands[0].low, bands[0].high), (17, 87));
//! assert_eq!((bands[2].low, bands[2].high), (35, 105));
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::types::{CutsError, CutsResult};

/// Default minimum number of bins per band.
pub const MIN_BAND_BINS: usize = 16;

/// Half-open range of frequency bins, `low..high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: usize,
    pub high: usize,
}

impl FrequencyBand {
    pub fn new(low: usize, high: usize) -> CutsResult<Self> {
        if low >= high {
            return Err(CutsError::Configuration(format!(
                "empty frequency band {}..{}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    /// Band covering `[f_low, f_high)` Hz, bins rounded to nearest.
    pub fn from_frequencies(f_low: f64, f_high: f64, df: f64) -> CutsResult<Self> {
        if !(df > 0.0) || f_low < 0.0 {
            return Err(CutsError::Configuration(format!(
                "invalid band {}..{} Hz at df={}",
                f_low, f_high, df
            )));
        }
        Self::new((f_low / df).round() as usize, (f_high / df).round() as usize)
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.high - self.low
    }

    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }

    /// Whether bin `k` lies in the band.
    pub fn contains(&self, k: usize) -> bool {
        k >= self.low && k < self.high
    }
}

/// Shift/width/count description of the low-frequency windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrequencyRange {
    /// Lower edge of the first window, Hz.
    pub fmin: f64,
    /// Shift between consecutive windows, Hz.
    pub fshift: f64,
    /// Width of every window, Hz.
    pub band: f64,
    /// Number of windows.
    #[serde(alias = "Nwin")]
    pub num_windows: usize,
    /// Minimum number of bins per window.
    pub min_bins: usize,
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self {
            fmin: 0.017,
            fshift: 0.009,
            band: 0.070,
            num_windows: 1,
            min_bins: MIN_BAND_BINS,
        }
    }
}

impl FrequencyRange {
    pub fn validate(&self) -> CutsResult<()> {
        if self.num_windows == 0 {
            return Err(CutsError::Configuration(
                "number of frequency windows must be at least 1".into(),
            ));
        }
        if !(self.fmin >= 0.0) || !(self.band > 0.0) || !(self.fshift >= 0.0) {
            return Err(CutsError::Configuration(format!(
                "invalid frequency range fmin={} fshift={} band={}",
                self.fmin, self.fshift, self.band
            )));
        }
        if self.min_bins == 0 {
            return Err(CutsError::Configuration(
                "minimum bins per band must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Bin ranges of every window at bin width `df`, in window order.
    pub fn partition(&self, df: f64) -> CutsResult<Vec<FrequencyBand>> {
        self.validate()?;
        if !(df > 0.0) {
            return Err(CutsError::Configuration(format!(
                "bin width must be positive, got {}",
                df
            )));
        }
        let bands = (0..self.num_windows)
            .map(|i| {
                let f_low = self.fmin + i as f64 * self.fshift;
                let low = (f_low / df).round() as usize;
                let mut high = ((f_low + self.band) / df).round() as usize;
                if high < low + self.min_bins {
                    high = low + self.min_bins;
                }
                FrequencyBand { low, high }
            })
            .collect();
        Ok(bands)
    }
}

/// Sine² taper over a band: ramps up over the first sixth of the bins and
/// down over the last sixth.
pub fn sine2_taper(len: usize) -> Vec<f64> {
    let edge = len / 6;
    let mut taper = vec![1.0; len];
    if edge < 2 {
        return taper;
    }
    for i in 0..edge {
        let x = i as f64 / (edge - 1) as f64;
        taper[i] = (x * PI / 2.0).sin().powi(2);
        taper[len - edge + i] = ((x + 1.0) * PI / 2.0).sin().powi(2);
    }
    taper
}

/// Band-relative indices of the bins carrying scan-synchronous harmonics.
///
/// Harmonics are the integer multiples of `scan_freq` up to the band's upper
/// edge. With `wide`, both the floor and ceiling bins of every harmonic are
/// flagged; otherwise only the nearest bin. A non-positive scan frequency has
/// no harmonics.
pub fn scan_harmonics(band: &FrequencyBand, df: f64, scan_freq: f64, wide: bool) -> Vec<usize> {
    if !(scan_freq > 0.0) || !(df > 0.0) {
        return Vec::new();
    }
    let f_high = band.high as f64 * df;
    let n_harm = (f_high / scan_freq).ceil() as usize;
    let mut bins: Vec<usize> = Vec::with_capacity(2 * n_harm);
    for k in 1..=n_harm {
        let f = k as f64 * scan_freq / df;
        if wide {
            bins.push(f.floor() as usize);
            bins.push(f.ceil() as usize);
        } else {
            bins.push(f.round() as usize);
        }
    }
    bins.sort_unstable();
    bins.dedup();
    bins.into_iter()
        .filter(|&k| band.contains(k))
        .map(|k| k - band.low)
        .collect()
}
