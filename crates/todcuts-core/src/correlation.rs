//! Per-band correlation scoring
//!
//! For one frequency band and one detector subset, measures how strongly
//! each detector follows the dominant common mode of the band:
//!
//! ```text
//!  X = spectrum[sel, band]            (n × bins)
//!    │ taper, deproject common modes, zero scan harmonics
//!    ▼
//!  C = X·Xᴴ,  cc = C / (|x_i|·|x_j|)   norm_i = √|C_ii| · √(2/nsamps)
//!    │
//!    ▼ preselect (median | groups) on |cc|
//!  X[presel] = U·S·Vᴴ
//!    correlation_i = |U_i0|·s_0 / √|C_ii|
//!    gain_i        = |U_i0|
//! ```
//!
//! All outputs are indexed over the full detector array; detectors outside
//! the selection (or with zero norm) score zero.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bands::{scan_harmonics, sine2_taper, FrequencyBand};
use crate::common_mode::CommonModes;
use crate::presel::{DetectorGroups, PreselMethod};
use crate::spectral::Spectrum;
use crate::types::{check_len, mask_indices, scatter, Complex, ComplexMatrix, CutsError, CutsResult, Mask};

/// Scan harmonics are only rejected when the scan frequency spans more than
/// this many bins.
pub const MIN_HARMONIC_SPACING_BINS: f64 = 7.0;

/// Accepted range of the per-sample norm, `norm / √nsamps`, exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "NormLimitRepr", into = "NormLimitRepr")]
pub struct NormLimit {
    pub min: f64,
    pub max: f64,
}

impl Default for NormLimit {
    fn default() -> Self {
        Self { min: 0.0, max: 1e15 }
    }
}

impl NormLimit {
    pub fn contains(&self, value: f64) -> bool {
        value > self.min && value < self.max
    }
}

/// A bare number is an upper limit; a pair is `[min, max]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum NormLimitRepr {
    Max(f64),
    Range([f64; 2]),
}

impl From<NormLimitRepr> for NormLimit {
    fn from(repr: NormLimitRepr) -> Self {
        match repr {
            NormLimitRepr::Max(max) => NormLimit { min: 0.0, max },
            NormLimitRepr::Range([min, max]) => NormLimit { min, max },
        }
    }
}

impl From<NormLimit> for NormLimitRepr {
    fn from(limit: NormLimit) -> Self {
        NormLimitRepr::Range([limit.min, limit.max])
    }
}

/// Preselection section of the scoring configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreselConfig {
    #[serde(flatten)]
    pub method: PreselMethod,
    #[serde(default)]
    pub norm_limit: NormLimit,
}

/// Options of the band scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Apply the sine² band-edge taper.
    pub use_taper: bool,
    /// Zero the scan-synchronous harmonic bins.
    pub cancel_sync: bool,
    /// Flag both neighbouring bins of every harmonic.
    pub wide: bool,
    /// Combine the first two singular components in quadrature.
    pub double_mode: bool,
    pub presel: PreselConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            use_taper: false,
            cancel_sync: false,
            wide: true,
            double_mode: false,
            presel: PreselConfig::default(),
        }
    }
}

/// Inputs of [`score_band`].
#[derive(Debug, Clone, Copy)]
pub struct BandInput<'a> {
    pub spectrum: &'a Spectrum,
    /// Detectors to score.
    pub selection: &'a [bool],
    pub band: FrequencyBand,
    /// Mechanical scan frequency, Hz. Zero disables harmonic rejection.
    pub scan_freq: f64,
    /// Modes to deproject; `None` or an empty set skips deprojection.
    pub modes: Option<&'a CommonModes>,
    /// Per-detector flatfield factors applied before the decomposition.
    pub scale: Option<&'a [f64]>,
}

/// Scores of every detector in one band.
#[derive(Debug, Clone)]
pub struct BandScore {
    pub band: FrequencyBand,
    pub preselected: Mask,
    pub correlation: Vec<f64>,
    pub gain: Vec<f64>,
    pub norm: Vec<f64>,
    /// Residual-to-original norm after deprojection (1 without modes).
    pub ratio: Vec<f64>,
    /// Projection coefficient of every mode on every detector, `[mode][detector]`.
    pub mode_coefficients: Vec<Vec<Complex>>,
    /// Normalized correlation matrix of the scored detectors.
    pub correlation_matrix: ComplexMatrix,
    /// Detector index of each row of `correlation_matrix`.
    pub scored: Vec<usize>,
    pub norm_selected: Mask,
    /// Grouping, when preselected by groups. Indices refer to `scored`.
    pub groups: Option<DetectorGroups>,
}

/// Remove the projection of every row of `data` onto each unit-norm mode.
///
/// Returns the coefficients, `[mode][row]`, and the ratio of residual to
/// original norm per row (1 for zero rows).
pub fn deproject(data: &mut ComplexMatrix, modes: &ComplexMatrix) -> (Vec<Vec<Complex>>, Vec<f64>) {
    let rows = data.nrows();
    let bins = data.ncols();
    let original: Vec<f64> = (0..rows).map(|r| data.row(r).norm()).collect();

    let mut coefficients = Vec::with_capacity(modes.nrows());
    for m in 0..modes.nrows() {
        let mut coeff = Vec::with_capacity(rows);
        for r in 0..rows {
            let c: Complex = (0..bins).map(|k| data[(r, k)].conj() * modes[(m, k)]).sum();
            let c_conj = c.conj();
            for k in 0..bins {
                data[(r, k)] -= c_conj * modes[(m, k)];
            }
            coeff.push(c);
        }
        coefficients.push(coeff);
    }

    let ratio = (0..rows)
        .map(|r| {
            let denom = if original[r] == 0.0 { 1.0 } else { original[r] };
            data.row(r).norm() / denom
        })
        .collect();
    (coefficients, ratio)
}

/// `C = X·Xᴴ` and the normalized `cc = C / outer(|x|, |x|)`, zero
/// denominators replaced by one.
pub fn correlation_matrices(data: &ComplexMatrix) -> (ComplexMatrix, ComplexMatrix) {
    let c = data * data.adjoint();
    let a: Vec<f64> = (0..data.nrows()).map(|r| data.row(r).norm()).collect();
    let cc = DMatrix::from_fn(c.nrows(), c.ncols(), |i, j| {
        let aa = a[i] * a[j];
        let aa = if aa == 0.0 { 1.0 } else { aa };
        c[(i, j)] / aa
    });
    (c, cc)
}

/// Score every selected detector against the dominant mode of `input.band`.
pub fn score_band(input: &BandInput<'_>, config: &ScoringConfig) -> CutsResult<BandScore> {
    let spectrum = input.spectrum;
    let ndet = spectrum.num_detectors();
    let band = input.band;
    check_len("detector selection", ndet, input.selection.len())?;
    if let Some(scale) = input.scale {
        check_len("flatfield scale", ndet, scale.len())?;
    }
    let sel = mask_indices(input.selection);
    if sel.is_empty() {
        return Err(CutsError::DegenerateInput(format!(
            "no detectors selected for band {}..{}",
            band.low, band.high
        )));
    }
    let nsamps = spectrum.nsamps() as f64;
    let df = spectrum.df();

    let mut data = spectrum.slice(&sel, &band)?;
    let nb = data.ncols();

    if config.use_taper {
        let taper = sine2_taper(nb);
        for (k, &t) in taper.iter().enumerate() {
            for r in 0..data.nrows() {
                data[(r, k)] *= t;
            }
        }
    }

    // deproject common modes
    let mut mode_coefficients = Vec::new();
    let mut ratio = scatter(ndet, &sel, &vec![1.0; sel.len()], 0.0);
    if let Some(modes) = input.modes.filter(|m| !m.is_empty()) {
        check_len("common mode bins", nb, modes.frequency.ncols())?;
        let (coeffs, local_ratio) = deproject(&mut data, &modes.frequency);
        mode_coefficients = coeffs
            .iter()
            .map(|c| scatter(ndet, &sel, c, Complex::new(0.0, 0.0)))
            .collect();
        ratio = scatter(ndet, &sel, &local_ratio, 0.0);
    }

    // scan-synchronous pickup
    if config.cancel_sync && input.scan_freq > 0.0 && input.scan_freq / df > MIN_HARMONIC_SPACING_BINS {
        let harmonics = scan_harmonics(&band, df, input.scan_freq, config.wide);
        for &k in &harmonics {
            for r in 0..data.nrows() {
                data[(r, k)] = Complex::new(0.0, 0.0);
            }
        }
        debug!(bins = harmonics.len(), "Zeroed scan harmonics");
    }

    let (c, cc) = correlation_matrices(&data);

    let fnorm: Vec<f64> = (0..sel.len()).map(|i| c[(i, i)].norm().sqrt()).collect();
    let local_norm: Vec<f64> = fnorm.iter().map(|f| f * (2.0 / nsamps).sqrt()).collect();
    let norm = scatter(ndet, &sel, &local_norm, 0.0);
    let limit = config.presel.norm_limit;
    let norm_selected: Mask = norm.iter().map(|n| limit.contains(n / nsamps.sqrt())).collect();

    let candidates: Vec<bool> = sel.iter().map(|&d| norm_selected[d]).collect();
    let abs_cc = DMatrix::from_fn(cc.nrows(), cc.ncols(), |i, j| cc[(i, j)].norm());
    let presel = config.presel.method.preselect(&abs_cc, &candidates);
    let preselected = scatter(ndet, &sel, &presel.selected, false);

    if let Some(scale) = input.scale {
        for (r, &d) in sel.iter().enumerate() {
            let s = Complex::new(scale[d], 0.0);
            for k in 0..nb {
                data[(r, k)] *= s;
            }
        }
    }

    let picked = mask_indices(&presel.selected);
    if picked.is_empty() {
        return Err(CutsError::DegenerateInput(format!(
            "no detectors preselected in band {}..{}",
            band.low, band.high
        )));
    }
    let sub = DMatrix::from_fn(picked.len(), nb, |r, k| data[(picked[r], k)]);
    let svd = sub.svd(true, false);
    let u = svd
        .u
        .ok_or_else(|| CutsError::DegenerateInput("SVD did not return left singular vectors".into()))?;
    let s = &svd.singular_values;

    let mut correlation = vec![0.0; ndet];
    let mut gain = vec![0.0; ndet];
    for (r, &i) in picked.iter().enumerate() {
        let d = sel[i];
        if fnorm[i] == 0.0 {
            continue;
        }
        let first = u[(r, 0)].norm() * s[0];
        correlation[d] = if config.double_mode && s.len() > 1 {
            let second = u[(r, 1)].norm() * s[1];
            (first * first + second * second).sqrt() / fnorm[i]
        } else {
            first / fnorm[i]
        };
        gain[d] = u[(r, 0)].norm();
    }

    debug!(
        low = band.low,
        high = band.high,
        selected = sel.len(),
        preselected = picked.len(),
        "Scored band"
    );

    Ok(BandScore {
        band,
        preselected,
        correlation,
        gain,
        norm,
        ratio,
        mode_coefficients,
        correlation_matrix: cc,
        scored: sel,
        norm_selected,
        groups: presel.groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common_mode::{extract_common_modes, CommonModeOptions};
    use crate::fft_utils::Trend;
    use crate::presel::{GroupParams, MedianParams};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    const NBINS: usize = 65;

    /// Spectrum whose rows are `amp_d · template + noise`, with the last
    /// `outliers` rows carrying an unrelated template instead. The two
    /// templates live on disjoint (even and odd) bins.
    fn common_mode_spectrum(amps: &[f64], outliers: usize, seed: u64) -> Spectrum {
        noisy_spectrum(amps, outliers, 0.05, seed)
    }

    fn noisy_spectrum(amps: &[f64], outliers: usize, sigma: f64, seed: u64) -> Spectrum {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, sigma).unwrap();
        let zero = Complex::new(0.0, 0.0);
        let template: Vec<Complex> = (0..NBINS)
            .map(|k| if k % 2 == 0 { Complex::from_polar(1.0, 0.37 * (k * k) as f64) } else { zero })
            .collect();
        let other: Vec<Complex> = (0..NBINS)
            .map(|k| if k % 2 == 1 { Complex::from_polar(1.0, 1.91 * k as f64) } else { zero })
            .collect();
        let n = amps.len();
        let data = DMatrix::from_fn(n, NBINS, |r, k| {
            let base = if r >= n - outliers { other[k] } else { template[k] };
            base * amps[r] + Complex::new(noise.sample(&mut rng), noise.sample(&mut rng))
        });
        let nf = 2 * (NBINS - 1);
        Spectrum::from_parts(data, vec![Trend::default(); n], 0.01, nf, nf).unwrap()
    }

    fn band() -> FrequencyBand {
        FrequencyBand::new(8, 56).unwrap()
    }

    fn input<'a>(spectrum: &'a Spectrum, selection: &'a [bool]) -> BandInput<'a> {
        BandInput {
            spectrum,
            selection,
            band: band(),
            scan_freq: 0.0,
            modes: None,
            scale: None,
        }
    }

    #[test]
    fn test_outlier_not_preselected() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0, 1.5, 1.0], 1, 7);
        let sel = vec![true; 4];
        let score = score_band(&input(&spectrum, &sel), &ScoringConfig::default()).unwrap();
        assert_eq!(score.preselected, vec![true, true, true, false]);
        assert_eq!(score.correlation[3], 0.0);
        assert_eq!(score.gain[3], 0.0);
        for d in 0..3 {
            assert!(score.correlation[d] > 0.95, "corr[{}] = {}", d, score.correlation[d]);
        }
        // gains follow the amplitudes, unit-norm over the preselected set
        assert!(score.gain[1] > score.gain[2] && score.gain[2] > score.gain[0]);
        let gnorm: f64 = score.gain.iter().map(|g| g * g).sum();
        assert!((gnorm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_outputs_cover_all_detectors() {
        let spectrum = common_mode_spectrum(&[1.0, 1.0, 1.0, 1.0, 1.0], 0, 3);
        let sel = vec![true, false, true, true, false];
        let score = score_band(&input(&spectrum, &sel), &ScoringConfig::default()).unwrap();
        for v in [&score.correlation, &score.gain, &score.norm, &score.ratio] {
            assert_eq!(v.len(), 5);
        }
        assert_eq!(score.preselected.len(), 5);
        assert_eq!(score.norm_selected.len(), 5);
        assert_eq!(score.norm[1], 0.0);
        assert!(!score.preselected[4]);
        assert_eq!(score.scored, vec![0, 2, 3]);
        assert_eq!(score.correlation_matrix.shape(), (3, 3));
    }

    #[test]
    fn test_norm_matches_definition() {
        let spectrum = common_mode_spectrum(&[1.0, 3.0, 2.0], 0, 11);
        let sel = vec![true; 3];
        let score = score_band(&input(&spectrum, &sel), &ScoringConfig::default()).unwrap();
        let block = spectrum.slice(&[1], &band()).unwrap();
        let expected = block.row(0).norm() * (2.0 / spectrum.nsamps() as f64).sqrt();
        assert!((score.norm[1] - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn test_correlation_matrix_hermitian() {
        let spectrum = common_mode_spectrum(&[1.0, 0.5, 2.0, 1.2, 0.8], 2, 5);
        let block = spectrum.slice(&[0, 1, 2, 3, 4], &band()).unwrap();
        let (c, cc) = correlation_matrices(&block);
        for i in 0..5 {
            assert!(c[(i, i)].re >= 0.0);
            assert!(c[(i, i)].im.abs() < 1e-9);
            assert!((cc[(i, i)].re - 1.0).abs() < 1e-9);
            for j in 0..5 {
                assert!((c[(i, j)] - c[(j, i)].conj()).norm() < 1e-9);
                assert!(cc[(i, j)].norm() <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn test_zero_rows_guarded() {
        let data = DMatrix::from_fn(2, 4, |r, k| {
            if r == 0 {
                Complex::new(0.0, 0.0)
            } else {
                Complex::new(k as f64, 1.0)
            }
        });
        let (_, cc) = correlation_matrices(&data);
        assert!(cc.iter().all(|x| x.re.is_finite() && x.im.is_finite()));
        assert_eq!(cc[(0, 1)], Complex::new(0.0, 0.0));
    }

    #[test]
    fn test_orthogonal_deprojection_is_identity() {
        let mut data = DMatrix::from_fn(3, 8, |r, k| {
            if k < 4 {
                Complex::new((r + k) as f64, r as f64 - 1.0)
            } else {
                Complex::new(0.0, 0.0)
            }
        });
        let original = data.clone();
        // supported on the other half of the bins
        let modes = DMatrix::from_fn(1, 8, |_, k| {
            if k >= 4 {
                Complex::new(0.5, 0.0)
            } else {
                Complex::new(0.0, 0.0)
            }
        });
        let (coeffs, ratio) = deproject(&mut data, &modes);
        assert!((&data - &original).norm() < 1e-12);
        assert!(coeffs[0].iter().all(|c| c.norm() < 1e-12));
        assert!(ratio.iter().all(|r| (r - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_deprojection_removes_mode() {
        let mode: Vec<Complex> = (0..8).map(|k| Complex::from_polar(1.0 / 8f64.sqrt(), 0.3 * k as f64)).collect();
        let modes = DMatrix::from_fn(1, 8, |_, k| mode[k]);
        let mut data = DMatrix::from_fn(2, 8, |r, k| mode[k] * Complex::new(2.0 + r as f64, -1.0));
        let (coeffs, ratio) = deproject(&mut data, &modes);
        assert!(data.norm() < 1e-12);
        assert!(ratio.iter().all(|r| r.abs() < 1e-12));
        assert!((coeffs[0][0].norm() - 5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_modes_match_no_deprojection() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0, 1.5, 1.0], 1, 19);
        let sel = vec![true; 4];
        let config = ScoringConfig {
            use_taper: true,
            ..Default::default()
        };
        let modes = extract_common_modes(
            &spectrum,
            &[false; 4],
            &band(),
            None,
            &CommonModeOptions {
                taper: true,
                svd: None,
            },
        )
        .unwrap();
        assert!(modes.is_empty());

        let plain = score_band(&input(&spectrum, &sel), &config).unwrap();
        let mut with_modes = input(&spectrum, &sel);
        with_modes.modes = Some(&modes);
        let skipped = score_band(&with_modes, &config).unwrap();

        assert_eq!(plain.preselected, skipped.preselected);
        assert_eq!(plain.correlation, skipped.correlation);
        assert_eq!(plain.gain, skipped.gain);
        assert_eq!(plain.norm, skipped.norm);
        assert_eq!(plain.ratio, skipped.ratio);
        assert!(skipped.mode_coefficients.is_empty());
    }

    #[test]
    fn test_deprojecting_shared_mode_lowers_ratio() {
        let spectrum = noisy_spectrum(&[1.0, 2.0, 1.5, 1.0, 1.2, 0.9], 0, 0.01, 23);
        let reference = vec![true, true, false, false, false, false];
        let options = CommonModeOptions {
            taper: false,
            svd: Some(crate::common_mode::ModeSelection::Dominant),
        };
        let modes = extract_common_modes(&spectrum, &reference, &band(), None, &options).unwrap();
        assert_eq!(modes.len(), 1);

        let mut block = spectrum.slice(&[2, 3, 4, 5], &band()).unwrap();
        let (coeffs, ratio) = deproject(&mut block, &modes.frequency);
        assert_eq!(coeffs.len(), 1);
        // only uncorrelated noise is left
        for (i, r) in ratio.iter().enumerate() {
            assert!(*r < 0.1, "ratio[{}] = {}", i, r);
        }
        let amps = [1.5, 1.0, 1.2, 0.9];
        let scale = coeffs[0][0].norm() / amps[0];
        for (c, a) in coeffs[0].iter().zip(amps) {
            assert!((c.norm() / a - scale).abs() < 0.05 * scale);
        }
    }

    #[test]
    fn test_zero_scan_frequency_skips_harmonics() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0, 1.5, 1.0], 1, 29);
        let sel = vec![true; 4];
        let config = ScoringConfig {
            cancel_sync: true,
            ..Default::default()
        };
        let with_sync = score_band(&input(&spectrum, &sel), &config).unwrap();
        let without = score_band(&input(&spectrum, &sel), &ScoringConfig::default()).unwrap();
        assert_eq!(with_sync.correlation, without.correlation);
        assert!(with_sync.correlation.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_cancel_sync_zeroes_harmonic_bins() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0, 1.5, 1.0], 1, 31);
        let sel = vec![true; 4];
        let config = ScoringConfig {
            cancel_sync: true,
            wide: false,
            ..Default::default()
        };
        let mut inp = input(&spectrum, &sel);
        // ten bins per harmonic
        inp.scan_freq = 10.0 * spectrum.df();
        let score = score_band(&inp, &config).unwrap();
        let block = spectrum.slice(&[0], &band()).unwrap();
        let mut kept = block.clone();
        for k in scan_harmonics(&band(), spectrum.df(), inp.scan_freq, false) {
            kept[(0, k)] = Complex::new(0.0, 0.0);
        }
        let expected = kept.row(0).norm() * (2.0 / spectrum.nsamps() as f64).sqrt();
        assert!((score.norm[0] - expected).abs() < 1e-9 * expected);
        assert!(score.norm[0] < block.row(0).norm() * (2.0 / spectrum.nsamps() as f64).sqrt());
    }

    #[test]
    fn test_double_mode_not_below_single() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0, 1.5, 1.0, 1.3], 0, 37);
        let sel = vec![true; 5];
        let single = score_band(&input(&spectrum, &sel), &ScoringConfig::default()).unwrap();
        let double = score_band(
            &input(&spectrum, &sel),
            &ScoringConfig {
                double_mode: true,
                ..Default::default()
            },
        )
        .unwrap();
        for d in 0..5 {
            assert!(double.correlation[d] >= single.correlation[d] - 1e-12);
        }
    }

    #[test]
    fn test_flatfield_scale_keeps_gain_unit_norm() {
        let spectrum = common_mode_spectrum(&[1.0, 1.0, 1.0, 1.0], 0, 41);
        let sel = vec![true; 4];
        let scale = vec![1.0, 2.0, 1.0, 1.0];
        let mut inp = input(&spectrum, &sel);
        inp.scale = Some(&scale);
        let score = score_band(&inp, &ScoringConfig::default()).unwrap();
        assert!(score.gain[1] > 1.5 * score.gain[0]);
    }

    #[test]
    fn test_norm_limit_excludes_detectors() {
        let spectrum = common_mode_spectrum(&[1.0, 1.0, 1.0, 50.0], 0, 43);
        let sel = vec![true; 4];
        let probe = score_band(&input(&spectrum, &sel), &ScoringConfig::default()).unwrap();
        let per_sample = probe.norm[0] / (spectrum.nsamps() as f64).sqrt();
        let mut config = ScoringConfig::default();
        config.presel.norm_limit = NormLimit {
            min: 0.0,
            max: per_sample * 5.0,
        };
        let score = score_band(&input(&spectrum, &sel), &config).unwrap();
        assert!(!score.norm_selected[3]);
        assert!(!score.preselected[3]);
        assert!(score.preselected[..3].iter().all(|&p| p));
    }

    #[test]
    fn test_groups_method_reports_groups() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0, 1.5, 1.0, 1.1, 0.7], 2, 47);
        let sel = vec![true; 6];
        let mut config = ScoringConfig::default();
        config.presel.method = PreselMethod::Groups(GroupParams {
            min_group_size: 1,
            init_corr: 0.9,
            ..Default::default()
        });
        let score = score_band(&input(&spectrum, &sel), &config).unwrap();
        let groups = score.groups.as_ref().unwrap();
        assert_eq!(groups.dominant, Some(0));
        assert_eq!(groups.groups[0], vec![0, 1, 2, 3]);
        assert_eq!(score.preselected, vec![true, true, true, true, false, false]);
    }

    #[test]
    fn test_empty_selection_is_degenerate() {
        let spectrum = common_mode_spectrum(&[1.0, 2.0], 0, 53);
        let err = score_band(&input(&spectrum, &[false, false]), &ScoringConfig::default()).unwrap_err();
        assert!(matches!(err, CutsError::DegenerateInput(_)));
    }

    #[test]
    fn test_empty_preselection_is_degenerate() {
        // two unrelated detectors never reach the median threshold
        let spectrum = common_mode_spectrum(&[1.0, 1.0], 1, 59);
        let mut config = ScoringConfig::default();
        config.presel.method = PreselMethod::Median(MedianParams {
            super_min_corr: 2.0,
            ..Default::default()
        });
        let err = score_band(&input(&spectrum, &[true, true]), &config).unwrap_err();
        assert!(matches!(err, CutsError::DegenerateInput(_)));
    }

    #[test]
    fn test_norm_limit_from_json() {
        let scalar: PreselConfig = serde_json::from_str(r#"{"method": "median", "normLimit": 5.0}"#).unwrap();
        assert_eq!(scalar.norm_limit, NormLimit { min: 0.0, max: 5.0 });
        let pair: PreselConfig = serde_json::from_str(r#"{"method": "median", "normLimit": [1.0, 5.0]}"#).unwrap();
        assert_eq!(pair.norm_limit, NormLimit { min: 1.0, max: 5.0 });
    }
}
