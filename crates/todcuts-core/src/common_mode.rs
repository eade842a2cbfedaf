//! Common-mode extraction
//!
//! Shared (common-mode) noise is estimated from a reference set of detectors
//! that do not see the sky signal, typically the dark detectors, optionally
//! stacked with thermometer spectra. The stacked rows are unit-normalized and
//! either used directly as deprojection vectors or reduced to their dominant
//! right singular vectors:
//!
//! ```text
//!  reference rows ─┐
//!                  ├─▶ taper ─▶ normalize ─▶ [SVD: keep s_i > s_max/10 or first N] ─▶ frequency modes
//!  thermometry  ───┘                                                                    │
//!                                                                  inverse FFT at band.low
//!                                                                                        ▼
//!                                                                              time-domain modes + trends
//! ```
//!
//! An empty reference set is not an error: the result is an empty mode set
//! and deprojection is skipped downstream.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bands::{sine2_taper, FrequencyBand};
use crate::spectral::{time_domain_modes, Spectrum, TimeDomainModes};
use crate::types::{check_len, mask_indices, Complex, ComplexMatrix, CutsError, CutsResult};

/// How many singular vectors to keep when orthogonalizing the reference rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSelection {
    /// Keep every mode whose singular value exceeds a tenth of the largest.
    Dominant,
    /// Keep the first `n` modes.
    Fixed(usize),
}

/// Options of [`extract_common_modes`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommonModeOptions {
    /// Apply the sine² band-edge taper to the reference rows.
    pub taper: bool,
    /// Orthogonalize via SVD; `None` keeps the normalized rows as-is.
    pub svd: Option<ModeSelection>,
}

/// Basis of shared-signal vectors over one band.
#[derive(Debug, Clone)]
pub struct CommonModes {
    pub band: FrequencyBand,
    /// One unit-norm mode per row, `band.len()` columns.
    pub frequency: ComplexMatrix,
    /// Matching unit-norm waveforms and their trends.
    pub time: TimeDomainModes,
}

impl CommonModes {
    pub fn empty(band: FrequencyBand) -> Self {
        Self {
            band,
            frequency: DMatrix::from_element(0, band.len(), Complex::new(0.0, 0.0)),
            time: TimeDomainModes::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.frequency.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.nrows() == 0
    }
}

/// Derive common modes over `band` from the `reference` detectors and the
/// optional `thermometry` rows (already transformed and sliced to `band`).
pub fn extract_common_modes(
    spectrum: &Spectrum,
    reference: &[bool],
    band: &FrequencyBand,
    thermometry: Option<&ComplexMatrix>,
    options: &CommonModeOptions,
) -> CutsResult<CommonModes> {
    check_len("reference mask", spectrum.num_detectors(), reference.len())?;
    spectrum.check_band(band)?;
    let nb = band.len();
    if let Some(therm) = thermometry {
        check_len("thermometry bins", nb, therm.ncols())?;
    }

    let reference_rows = spectrum.slice(&mask_indices(reference), band)?;
    let mut rows: Vec<Vec<Complex>> = reference_rows
        .row_iter()
        .map(|r| r.iter().copied().collect())
        .collect();
    if let Some(therm) = thermometry {
        rows.extend(therm.row_iter().map(|r| r.iter().copied().collect::<Vec<_>>()));
    }

    if options.taper {
        let taper = sine2_taper(nb);
        for row in rows.iter_mut() {
            for (x, &t) in row.iter_mut().zip(&taper) {
                *x *= t;
            }
        }
    }

    // zero rows carry no direction
    rows.retain(|row| row.iter().any(|x| x.norm_sqr() > 0.0));
    if rows.is_empty() {
        debug!(low = band.low, high = band.high, "No reference rows, common modes empty");
        return Ok(CommonModes::empty(*band));
    }

    let mut stacked = DMatrix::from_fn(rows.len(), nb, |r, c| rows[r][c]);
    for mut row in stacked.row_iter_mut() {
        let norm = row.norm();
        row /= Complex::new(norm, 0.0);
    }

    let frequency = match options.svd {
        None => stacked,
        Some(selection) => dominant_modes(stacked, selection)?,
    };

    let mut time = time_domain_modes(&frequency, band.low, spectrum.df());
    for wave in time.waveforms.iter_mut() {
        let norm = wave.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            wave.iter_mut().for_each(|x| *x /= norm);
        }
    }

    debug!(
        low = band.low,
        high = band.high,
        modes = frequency.nrows(),
        "Extracted common modes"
    );
    Ok(CommonModes {
        band: *band,
        frequency,
        time,
    })
}

/// Right singular vectors of the stacked rows, largest first.
fn dominant_modes(stacked: ComplexMatrix, selection: ModeSelection) -> CutsResult<ComplexMatrix> {
    let nb = stacked.ncols();
    let svd = stacked.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CutsError::DegenerateInput("SVD did not return right singular vectors".into()))?;
    let s = &svd.singular_values;
    let available = s.len();

    let keep = match selection {
        ModeSelection::Fixed(n) => n.min(available),
        ModeSelection::Dominant => {
            let s_max = s.iter().cloned().fold(0.0_f64, f64::max);
            s.iter().filter(|&&v| v > s_max / 10.0).count()
        }
    };

    Ok(DMatrix::from_fn(keep, nb, |r, c| v_t[(r, c)]))
}
