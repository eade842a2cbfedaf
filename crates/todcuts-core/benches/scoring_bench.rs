//! Benchmarks for the scoring stages
//!
//! Run with: cargo bench -p todcuts-core --bench scoring_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use todcuts_core::high_freq::{high_freq_stats, HighFreqOptions};
use todcuts_core::prelude::*;

const DT: f64 = 0.0025;

/// Common low-frequency signal with per-detector gain plus white noise.
fn synthetic_array(ndet: usize, nsamps: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.2).unwrap();
    let common: Vec<f64> = (0..nsamps)
        .map(|i| {
            let t = i as f64 * DT;
            (2.0 * PI * 0.05 * t).sin() + 0.5 * (2.0 * PI * 0.08 * t + 0.3).sin()
        })
        .collect();
    (0..ndet)
        .map(|d| {
            let gain = 0.8 + 0.4 * (d % 7) as f64 / 6.0;
            common.iter().map(|&c| gain * c + noise.sample(&mut rng)).collect()
        })
        .collect()
}

// ============================================================================
// Front End
// ============================================================================

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectrum_transform");
    group.sample_size(20);

    for nsamps in [10_000usize, 40_000, 100_000].iter() {
        let data = synthetic_array(64, *nsamps);
        group.throughput(Throughput::Elements((64 * nsamps) as u64));
        group.bench_with_input(BenchmarkId::new("64_detectors", nsamps), &data, |b, data| {
            b.iter(|| Spectrum::transform(black_box(data), DT).unwrap())
        });
    }

    group.finish();
}

// ============================================================================
// Band Scoring
// ============================================================================

fn bench_score_band(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_band");
    group.sample_size(20);

    let range = FrequencyRange::default();
    for ndet in [64usize, 256, 512].iter() {
        let spectrum = Spectrum::transform(&synthetic_array(*ndet, 80_000), DT).unwrap();
        let band = range.partition(spectrum.df()).unwrap()[0];
        let selection = vec![true; *ndet];
        let input = BandInput {
            spectrum: &spectrum,
            selection: &selection,
            band,
            scan_freq: 0.1,
            modes: None,
            scale: None,
        };

        group.bench_with_input(BenchmarkId::new("median", ndet), &input, |b, input| {
            b.iter(|| score_band(black_box(input), &ScoringConfig::default()).unwrap())
        });
    }

    group.finish();
}

fn bench_deprojection(c: &mut Criterion) {
    let mut group = c.benchmark_group("dark_deprojection");
    group.sample_size(20);

    let ndet = 256;
    let spectrum = Spectrum::transform(&synthetic_array(ndet, 80_000), DT).unwrap();
    let band = FrequencyRange::default().partition(spectrum.df()).unwrap()[0];
    let selection: Vec<bool> = (0..ndet).map(|d| d >= 16).collect();
    let dark: Vec<bool> = (0..ndet).map(|d| d < 16).collect();

    for (name, svd) in [("rows", None), ("svd", Some(ModeSelection::Dominant))].iter() {
        let options = CommonModeOptions { taper: false, svd: *svd };
        let modes = extract_common_modes(&spectrum, &dark, &band, None, &options).unwrap();
        let input = BandInput {
            spectrum: &spectrum,
            selection: &selection,
            band,
            scan_freq: 0.1,
            modes: Some(&modes),
            scale: None,
        };
        group.bench_function(*name, |b| {
            b.iter(|| score_band(black_box(&input), &ScoringConfig::default()).unwrap())
        });
    }

    group.finish();
}

// ============================================================================
// Noise Statistics
// ============================================================================

fn bench_high_freq(c: &mut Criterion) {
    let mut group = c.benchmark_group("high_freq_stats");
    group.sample_size(20);

    let ndet = 128;
    let spectrum = Spectrum::transform(&synthetic_array(ndet, 40_000), DT).unwrap();
    let band = FrequencyBand::from_frequencies(9.0, 19.0, spectrum.df()).unwrap();
    let selection = vec![true; ndet];

    for modes in [0usize, 10].iter() {
        let options = HighFreqOptions {
            modes: *modes,
            high_order: true,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("modes", modes), &options, |b, options| {
            b.iter(|| high_freq_stats(&spectrum, black_box(&selection), &band, options).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_transform,
    bench_score_band,
    bench_deprojection,
    bench_high_freq
);
criterion_main!(benches);
