//! High-frequency noise statistics
//!
//! Per detector over one band: the rms of the band power and, optionally, the
//! skewness and kurtosis normality tests of the band-limited time stream.
//! Strong common modes can first be regressed out with kernels built from
//! the preselected detectors:
//!
//! ```text
//!  X[presel]·X[presel]ᴴ = U·W·Vᴴ
//!  kernel_i = v_i / √w_i            (i < modes)
//!  M = kernel · X[presel]           orthonormal band modes
//!  X ← X − (M·Xᴴ)ᴴ · M
//! ```
//!
//! With scan segmentation the time stream is also cut into `count`
//! segments of `period` samples starting at `pivot`, and each segment gets
//! its own rms and moment tests.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::bands::FrequencyBand;
use crate::spectral::{time_domain_modes, Spectrum};
use crate::types::{check_len, mask_indices, scatter, Complex, ComplexMatrix, CutsResult};

/// Scan-cycle segmentation, in samples of the original time stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSegments {
    /// Samples per scan half-cycle.
    pub period: f64,
    /// First sample of the first segment.
    pub pivot: f64,
    /// Number of segments.
    #[serde(alias = "N")]
    pub count: usize,
}

/// Options of [`high_freq_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HighFreqOptions<'a> {
    /// Number of common modes to regress out.
    pub modes: usize,
    /// Detectors the common-mode kernels are built from. Defaults to the
    /// whole selection.
    pub preselected: Option<&'a [bool]>,
    /// Compute skewness and kurtosis tests.
    pub high_order: bool,
    pub segments: Option<ScanSegments>,
}

/// Outcome of a normality test: the z statistic and its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentTest {
    pub statistic: f64,
    pub p_value: f64,
}

impl Default for MomentTest {
    fn default() -> Self {
        Self {
            statistic: 0.0,
            p_value: 1.0,
        }
    }
}

/// Statistics of every scan segment, `[detector][segment]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SegmentStats {
    pub rms: Vec<Vec<f64>>,
    pub skew: Vec<Vec<MomentTest>>,
    pub kurtosis: Vec<Vec<MomentTest>>,
}

/// High-frequency statistics over the full detector set.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NoiseStats {
    pub rms: Vec<f64>,
    /// Present when high-order statistics were requested.
    pub skew: Option<Vec<MomentTest>>,
    pub kurtosis: Option<Vec<MomentTest>>,
    pub segments: Option<SegmentStats>,
}

/// Rms, and optionally moment tests, of the `sel` detectors over `band`.
pub fn high_freq_stats(
    spectrum: &Spectrum,
    sel: &[bool],
    band: &FrequencyBand,
    options: &HighFreqOptions<'_>,
) -> CutsResult<NoiseStats> {
    let ndet = spectrum.num_detectors();
    check_len("detector selection", ndet, sel.len())?;
    let rows = mask_indices(sel);
    let mut data = spectrum.slice(&rows, band)?;
    let nsamps = spectrum.nsamps() as f64;

    if options.modes > 0 && !rows.is_empty() {
        let pre: Vec<usize> = match options.preselected {
            Some(p) => {
                check_len("preselection", ndet, p.len())?;
                rows.iter()
                    .enumerate()
                    .filter_map(|(i, &d)| p[d].then_some(i))
                    .collect()
            }
            None => (0..rows.len()).collect(),
        };
        let removed = remove_kernel_modes(&mut data, &pre, options.modes);
        debug!(
            low = band.low,
            high = band.high,
            requested = options.modes,
            removed,
            "Regressed out high-frequency common modes"
        );
    }

    let nb = data.ncols() as f64;
    let local_rms: Vec<f64> = data
        .row_iter()
        .map(|r| (r.norm_squared() / (nb * nsamps)).sqrt())
        .collect();
    let mut stats = NoiseStats {
        rms: scatter(ndet, &rows, &local_rms, 0.0),
        ..Default::default()
    };
    if !options.high_order {
        return Ok(stats);
    }

    let time = time_domain_modes(&data, 1, spectrum.df());
    let skew: Vec<MomentTest> = time.waveforms.iter().map(|w| skew_test(w)).collect();
    let kurt: Vec<MomentTest> = time.waveforms.iter().map(|w| kurtosis_test(w)).collect();
    stats.skew = Some(scatter(ndet, &rows, &skew, MomentTest::default()));
    stats.kurtosis = Some(scatter(ndet, &rows, &kurt, MomentTest::default()));

    if let Some(seg) = options.segments {
        let f = time.num_samples() as f64 / nsamps;
        let len = (seg.period * f) as usize;
        let start = (seg.pivot * f) as usize;
        let mut out = SegmentStats {
            rms: vec![vec![0.0; seg.count]; ndet],
            skew: vec![vec![MomentTest::default(); seg.count]; ndet],
            kurtosis: vec![vec![MomentTest::default(); seg.count]; ndet],
        };
        for (i, &d) in rows.iter().enumerate() {
            let wave = &time.waveforms[i];
            for c in 0..seg.count {
                let lo = (c * len + start).min(wave.len());
                let hi = ((c + 1) * len + start).min(wave.len());
                let piece = &wave[lo..hi];
                out.rms[d][c] = std_dev(piece);
                out.skew[d][c] = skew_test(piece);
                out.kurtosis[d][c] = kurtosis_test(piece);
            }
        }
        stats.segments = Some(out);
    }
    Ok(stats)
}

/// Regress the strongest `modes` common modes of the `pre` rows out of
/// every row of `data`. Returns how many modes were removed.
fn remove_kernel_modes(data: &mut ComplexMatrix, pre: &[usize], modes: usize) -> usize {
    if pre.is_empty() {
        return 0;
    }
    let nb = data.ncols();
    let sub = DMatrix::from_fn(pre.len(), nb, |r, k| data[(pre[r], k)]);
    let c = &sub * sub.adjoint();
    let svd = c.svd(false, true);
    let v_t = match svd.v_t {
        Some(v) => v,
        None => return 0,
    };
    let w = &svd.singular_values;
    let w_max = w.iter().cloned().fold(0.0_f64, f64::max);

    // kernels of vanishing singular values would only amplify noise
    let keep: Vec<usize> = (0..modes.min(w.len()))
        .filter(|&i| w[i] > w_max * 1e-12 && w[i] > 0.0)
        .collect();
    if keep.is_empty() {
        return 0;
    }
    let kernel = DMatrix::from_fn(keep.len(), pre.len(), |r, j| {
        v_t[(keep[r], j)] / Complex::new(w[keep[r]].sqrt(), 0.0)
    });
    let band_modes = &kernel * &sub;
    let coeff = &band_modes * data.adjoint();
    *data -= coeff.adjoint() * &band_modes;
    keep.len()
}

fn central_moments(x: &[f64]) -> (f64, f64, f64) {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &v in x {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    central_moments(x).0.sqrt()
}

fn two_sided(z: f64) -> MomentTest {
    if !z.is_finite() {
        return MomentTest::default();
    }
    MomentTest {
        statistic: z,
        p_value: 2.0 * Normal::standard().sf(z.abs()),
    }
}

/// D'Agostino skewness test. Needs at least 8 samples.
pub fn skew_test(x: &[f64]) -> MomentTest {
    if x.len() < 8 {
        return MomentTest::default();
    }
    let n = x.len() as f64;
    let (m2, m3, _) = central_moments(x);
    if m2 <= 0.0 {
        return MomentTest::default();
    }
    let b2 = m3 / m2.powf(1.5);
    let y = b2 * ((n + 1.0) * (n + 3.0) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    two_sided(delta * (y / alpha).asinh())
}

/// Anscombe-Glynn kurtosis test. Needs at least 5 samples.
pub fn kurtosis_test(x: &[f64]) -> MomentTest {
    if x.len() < 5 {
        return MomentTest::default();
    }
    let n = x.len() as f64;
    let (m2, _, m4) = central_moments(x);
    if m2 <= 0.0 {
        return MomentTest::default();
    }
    let b2 = m4 / (m2 * m2);
    let e = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0) * (n + 1.0) * (n + 3.0) * (n + 5.0));
    let x_std = (b2 - e) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x_std * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return MomentTest::default();
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    two_sided((term1 - term2) / (2.0 / (9.0 * a)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Exp, Normal as NormalDist};

    fn gaussian(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = NormalDist::new(0.0, 1.0).unwrap();
        (0..n).map(|_| dist.sample(&mut rng)).collect()
    }

    #[test]
    fn test_skew_test_gaussian_not_significant() {
        let x = gaussian(5000, 1);
        let t = skew_test(&x);
        assert!(t.statistic.abs() < 4.0);
        assert!(t.p_value > 1e-4 && t.p_value <= 1.0);
    }

    #[test]
    fn test_skew_test_detects_right_tail() {
        let mut rng = StdRng::seed_from_u64(2);
        let exp = Exp::new(1.0).unwrap();
        let x: Vec<f64> = (0..2000).map(|_| exp.sample(&mut rng)).collect();
        let t = skew_test(&x);
        assert!(t.statistic > 10.0);
        assert!(t.p_value < 1e-10);

        let flipped: Vec<f64> = x.iter().map(|v| -v).collect();
        let f = skew_test(&flipped);
        assert!((f.statistic + t.statistic).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_sample_has_zero_skew_statistic() {
        let x = [-3.0, -2.0, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0, 3.0];
        let t = skew_test(&x);
        assert!(t.statistic.abs() < 1e-12);
        assert!((t.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_kurtosis_test_heavy_and_light_tails() {
        let x = gaussian(5000, 3);
        assert!(kurtosis_test(&x).statistic.abs() < 4.0);

        // a few large spikes give heavy tails
        let mut spiky = gaussian(2000, 4);
        for i in (0..2000).step_by(100) {
            spiky[i] *= 12.0;
        }
        let heavy = kurtosis_test(&spiky);
        assert!(heavy.statistic > 5.0 && heavy.p_value < 1e-6);

        // evenly spread values are light-tailed
        let flat: Vec<f64> = (0..1000).map(|i| i as f64 / 1000.0 - 0.5).collect();
        assert!(kurtosis_test(&flat).statistic < -5.0);
    }

    #[test]
    fn test_short_or_constant_segments() {
        assert_eq!(skew_test(&[1.0, 2.0, 3.0]), MomentTest::default());
        assert_eq!(kurtosis_test(&[1.0, 2.0]), MomentTest::default());
        assert_eq!(skew_test(&[2.0; 20]), MomentTest::default());
        assert_eq!(kurtosis_test(&[2.0; 20]), MomentTest::default());
        assert_eq!(std_dev(&[]), 0.0);
    }

    fn noise_spectrum(ndet: usize, nsamps: usize, common: f64, seed: u64) -> Spectrum {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = NormalDist::new(0.0, 1.0).unwrap();
        let shared: Vec<f64> = (0..nsamps).map(|_| dist.sample(&mut rng)).collect();
        let data: Vec<Vec<f64>> = (0..ndet)
            .map(|d| {
                let g = 1.0 + 0.1 * d as f64;
                shared
                    .iter()
                    .map(|s| common * g * s + dist.sample(&mut rng))
                    .collect()
            })
            .collect();
        Spectrum::transform(&data, 0.01).unwrap()
    }

    #[test]
    fn test_rms_matches_white_noise_level() {
        let spectrum = noise_spectrum(4, 4000, 0.0, 5);
        let band = FrequencyBand::new(500, 1500).unwrap();
        let stats = high_freq_stats(&spectrum, &[true, true, false, true], &band, &HighFreqOptions::default()).unwrap();
        assert_eq!(stats.rms.len(), 4);
        assert_eq!(stats.rms[2], 0.0);
        // unit white noise: E|X_k|² = nsamps
        for d in [0, 1, 3] {
            assert!((stats.rms[d] - 1.0).abs() < 0.1, "rms[{}] = {}", d, stats.rms[d]);
        }
        assert!(stats.skew.is_none() && stats.kurtosis.is_none());
    }

    #[test]
    fn test_common_mode_removal_lowers_rms() {
        let spectrum = noise_spectrum(8, 4000, 3.0, 6);
        let band = FrequencyBand::new(500, 1500).unwrap();
        let sel = vec![true; 8];
        let raw = high_freq_stats(&spectrum, &sel, &band, &HighFreqOptions::default()).unwrap();
        let cleaned = high_freq_stats(
            &spectrum,
            &sel,
            &band,
            &HighFreqOptions {
                modes: 1,
                ..Default::default()
            },
        )
        .unwrap();
        for d in 0..8 {
            assert!(raw.rms[d] > 2.5);
            assert!(cleaned.rms[d] < 1.1, "cleaned rms[{}] = {}", d, cleaned.rms[d]);
        }
    }

    #[test]
    fn test_empty_preselection_skips_kernel() {
        let spectrum = noise_spectrum(4, 2000, 2.0, 7);
        let band = FrequencyBand::new(100, 600).unwrap();
        let sel = vec![true; 4];
        let plain = high_freq_stats(&spectrum, &sel, &band, &HighFreqOptions::default()).unwrap();
        let none = [false; 4];
        let skipped = high_freq_stats(
            &spectrum,
            &sel,
            &band,
            &HighFreqOptions {
                modes: 2,
                preselected: Some(&none),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(plain.rms, skipped.rms);
    }

    #[test]
    fn test_high_order_and_segments_cover_all_detectors() {
        let spectrum = noise_spectrum(3, 4000, 0.0, 8);
        let band = FrequencyBand::new(200, 1200).unwrap();
        let segments = ScanSegments {
            period: 800.0,
            pivot: 100.0,
            count: 4,
        };
        let stats = high_freq_stats(
            &spectrum,
            &[true, false, true],
            &band,
            &HighFreqOptions {
                high_order: true,
                segments: Some(segments),
                ..Default::default()
            },
        )
        .unwrap();
        let skew = stats.skew.as_ref().unwrap();
        let kurt = stats.kurtosis.as_ref().unwrap();
        assert_eq!(skew.len(), 3);
        assert_eq!(kurt[1], MomentTest::default());
        assert!(skew[0].p_value > 0.0 && skew[0].p_value <= 1.0);

        let seg = stats.segments.as_ref().unwrap();
        assert_eq!(seg.rms.len(), 3);
        assert!(seg.rms.iter().all(|r| r.len() == 4));
        assert!(seg.rms[1].iter().all(|&r| r == 0.0));
        assert!(seg.rms[0].iter().all(|&r| r > 0.0));
        assert!(seg.skew[2].iter().all(|t| t.p_value > 0.0 && t.p_value <= 1.0));
    }

    #[test]
    fn test_segments_past_the_end_are_empty() {
        let spectrum = noise_spectrum(1, 1000, 0.0, 9);
        let band = FrequencyBand::new(50, 250).unwrap();
        let stats = high_freq_stats(
            &spectrum,
            &[true],
            &band,
            &HighFreqOptions {
                high_order: true,
                segments: Some(ScanSegments {
                    period: 600.0,
                    pivot: 0.0,
                    count: 3,
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let seg = stats.segments.unwrap();
        assert_eq!(seg.rms[0][2], 0.0);
        assert_eq!(seg.skew[0][2], MomentTest::default());
    }
}
