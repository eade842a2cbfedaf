//! Atmospheric 1/f power-law fit
//!
//! The low-frequency power of every selected detector is modelled as
//! `P(f) = level · f^exponent`, fitted in log-log space over
//! `[fminA, knee - 0.7 Hz)` with scan-harmonic bins excluded. The knee
//! frequency, where the power law meets the white-noise floor, is
//!
//! ```text
//!  knee = (noise / level)^(1 / exponent)
//! ```
//!
//! and the median knee of the array moves the upper edge of the fit window
//! on the next iteration.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::spectral::Spectrum;
use crate::types::{check_len, finite_median, mask_indices, scatter, CutsError, CutsResult};

/// Distance between the knee and the upper edge of the fit window, Hz.
pub const KNEE_MARGIN: f64 = 0.7;

/// Fit window and harmonic exclusion of the power-law fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtmFitConfig {
    /// Lower edge of the fit window, Hz.
    pub fmin_a: f64,
    /// Initial upper edge of the fit window, Hz.
    pub fmax_a: f64,
    /// Scan harmonics are excluded up to this frequency, Hz.
    pub fmax_t: f64,
    #[serde(alias = "its")]
    pub iterations: usize,
    /// Half-width of the excluded window around every harmonic, Hz.
    pub width: f64,
}

impl Default for AtmFitConfig {
    fn default() -> Self {
        Self {
            fmin_a: 0.2,
            fmax_a: 3.0,
            fmax_t: 10.0,
            iterations: 1,
            width: 0.005,
        }
    }
}

impl AtmFitConfig {
    pub fn validate(&self) -> CutsResult<()> {
        if !(self.fmin_a > 0.0) || !(self.fmax_a > self.fmin_a) {
            return Err(CutsError::Configuration(format!(
                "atmosphere fit window {}..{} Hz is empty",
                self.fmin_a, self.fmax_a
            )));
        }
        if self.iterations == 0 {
            return Err(CutsError::Configuration(
                "atmosphere fit needs at least one iteration".into(),
            ));
        }
        if !(self.width >= 0.0) || !(self.fmax_t > 0.0) {
            return Err(CutsError::Configuration(format!(
                "invalid harmonic exclusion fmaxT={} width={}",
                self.fmax_t, self.width
            )));
        }
        Ok(())
    }
}

/// Per-detector power-law parameters, zero outside the fitted selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AtmosphereModel {
    pub exponent: Vec<f64>,
    pub level: Vec<f64>,
    pub knee: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PowerLaw {
    exponent: f64,
    level: f64,
    knee: f64,
}

/// Fit the atmospheric power law of the `sel` detectors, with `noise` the
/// per-detector white-noise floor.
pub fn fit_atmosphere(
    spectrum: &Spectrum,
    sel: &[bool],
    noise: &[f64],
    scan_freq: f64,
    config: &AtmFitConfig,
) -> CutsResult<AtmosphereModel> {
    config.validate()?;
    let ndet = spectrum.num_detectors();
    check_len("detector selection", ndet, sel.len())?;
    check_len("noise floor", ndet, noise.len())?;

    let df = spectrum.df();
    let dt = spectrum.dt();
    let scale = 2.0 * dt * dt * df;
    let top = ((config.fmax_t / df) as usize).min(spectrum.num_bins());
    let excluded = harmonic_bins(scan_freq, df, config.fmax_t, config.width);
    let rows = mask_indices(sel);
    let matrix = spectrum.matrix();

    let power: Vec<Vec<f64>> = rows
        .iter()
        .map(|&d| (0..top).map(|k| matrix[(d, k)].norm_sqr() * scale).collect())
        .collect();

    let imin = ((config.fmin_a / df) as usize).max(1);
    let mut knee_median = config.fmax_a + KNEE_MARGIN;
    let mut fits = vec![PowerLaw::default(); rows.len()];

    for it in 0..config.iterations {
        let imax = (((knee_median - KNEE_MARGIN) / df) as usize).min(top);
        // harmonics are dropped strictly above the lower edge
        let window: Vec<usize> = (imin..imax)
            .filter(|&k| k == imin || !excluded.contains(&k))
            .collect();
        if window.len() < 2 {
            if it == 0 {
                return Err(CutsError::DegenerateInput(format!(
                    "atmosphere fit window {}..{} holds fewer than two usable bins",
                    imin, imax
                )));
            }
            warn!(iteration = it, knee = knee_median, "Atmosphere fit window collapsed, keeping previous fit");
            break;
        }

        // log-spacing weights, last one repeated
        let log_freq: Vec<f64> = (imin..imax).map(|k| (k as f64 * df).ln()).collect();
        let mut spacing: Vec<f64> = log_freq.windows(2).map(|p| p[1] - p[0]).collect();
        let last = spacing.last().copied().unwrap_or(1.0);
        spacing.push(last);

        for (i, &d) in rows.iter().enumerate() {
            fits[i] = fit_power_law(&power[i], &window, imin, df, &spacing, noise[d]);
        }

        let knees: Vec<f64> = fits.iter().map(|f| f.knee).filter(|k| *k > 0.0).collect();
        match finite_median(&knees) {
            Some(m) => knee_median = m,
            None => {
                warn!(iteration = it, "No finite knee frequency, keeping fit window");
                break;
            }
        }
        debug!(iteration = it, bins = window.len(), knee = knee_median, "Atmosphere fit iteration");
    }

    let pick = |f: fn(&PowerLaw) -> f64| -> Vec<f64> {
        let local: Vec<f64> = fits.iter().map(f).collect();
        scatter(ndet, &rows, &local, 0.0)
    };
    Ok(AtmosphereModel {
        exponent: pick(|p| p.exponent),
        level: pick(|p| p.level),
        knee: pick(|p| p.knee),
    })
}

/// Bins within `width` of every scan harmonic up to `fmax`.
fn harmonic_bins(scan_freq: f64, df: f64, fmax: f64, width: f64) -> Vec<usize> {
    if !(scan_freq > 0.0) {
        return Vec::new();
    }
    let n_harm = (fmax / scan_freq).ceil() as usize;
    let half = (width / df) as i64;
    let mut bins: Vec<usize> = (1..=n_harm)
        .flat_map(|h| {
            let centre = (h as f64 * scan_freq / df).round() as i64;
            (centre - half..=centre + half).filter(|&k| k >= 0).map(|k| k as usize)
        })
        .collect();
    bins.sort_unstable();
    bins.dedup();
    bins
}

/// Weighted least-squares line through `log P` against `log f` over the
/// `window` bins with positive power, then level and knee from the refitted
/// normalization. Fewer than two such bins leave the detector unfitted.
fn fit_power_law(power: &[f64], window: &[usize], imin: usize, df: f64, spacing: &[f64], noise: f64) -> PowerLaw {
    let usable: Vec<usize> = window.iter().copied().filter(|&k| power[k] > 0.0).collect();
    if usable.len() < 2 {
        return PowerLaw::default();
    }
    let (mut sw, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &k in &usable {
        let w = spacing[k - imin] * spacing[k - imin];
        let x = (k as f64 * df).ln();
        let y = power[k].ln();
        sw += w;
        sx += w * x;
        sy += w * y;
        sxx += w * x * x;
        sxy += w * x * y;
    }
    let det = sw * sxx - sx * sx;
    if det == 0.0 {
        return PowerLaw::default();
    }
    let exponent = (sw * sxy - sx * sy) / det;
    let intercept = (sy - exponent * sx) / sw;

    let (mut num, mut den) = (0.0, 0.0);
    for &k in &usable {
        let model = (k as f64 * df).powf(exponent) * intercept.exp();
        num += power[k] * model;
        den += model * model;
    }
    let level = if den > 0.0 { intercept.exp() * num / den } else { 0.0 };
    let knee = if exponent != 0.0 && level > 0.0 {
        (noise / level).powf(1.0 / exponent)
    } else {
        0.0
    };
    PowerLaw {
        exponent: if exponent.is_finite() { exponent } else { 0.0 },
        level: if level.is_finite() { level } else { 0.0 },
        knee: if knee.is_finite() { knee } else { 0.0 },
    }
}
