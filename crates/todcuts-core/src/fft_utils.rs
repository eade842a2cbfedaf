//! FFT utilities for real-valued detector time streams
//!
//! Detector data is real, so only the one-sided spectrum (bins `0..=n/2`) is
//! kept. The transforms follow the usual unnormalized-forward /
//! `1/n`-inverse convention:
//!
//! ```text
//!   X[k] = Σ_t x[t] · e^{-2πi·k·t/n}          k = 0 ..= n/2
//!   x[t] = (1/n) Σ_k X[k] · e^{+2πi·k·t/n}    (Hermitian completion of X)
//! ```
//!
//! Transform lengths are padded to "regular" numbers (only prime factors
//! 2, 3 and 5), for which mixed-radix FFTs are fast.

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Smallest integer `>= n` whose only prime factors are 2, 3 and 5.
///
/// Returns 1 for `n <= 1`.
pub fn next_regular(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let mut best = usize::MAX;
    let mut p5 = 1usize;
    while p5 < best {
        let mut p35 = p5;
        while p35 < best {
            // smallest power of two lifting p35 to at least n
            let mut candidate = p35;
            while candidate < n {
                candidate *= 2;
            }
            if candidate < best {
                best = candidate;
            }
            if p35 >= n {
                break;
            }
            p35 *= 3;
        }
        if p5 >= n {
            break;
        }
        p5 *= 5;
    }
    best
}

/// Linear trend of a series, stored as the fitted values at its end points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Trend {
    pub start: f64,
    pub end: f64,
}

impl Trend {
    /// Least-squares line through `series`.
    pub fn fit(series: &[f64]) -> Self {
        let n = series.len();
        match n {
            0 => Trend::default(),
            1 => Trend {
                start: series[0],
                end: series[0],
            },
            _ => {
                let nf = n as f64;
                let t_mean = (nf - 1.0) / 2.0;
                let y_mean = series.iter().sum::<f64>() / nf;
                let mut sxy = 0.0;
                let mut sxx = 0.0;
                for (t, &y) in series.iter().enumerate() {
                    let dt = t as f64 - t_mean;
                    sxy += dt * (y - y_mean);
                    sxx += dt * dt;
                }
                let slope = sxy / sxx;
                Trend {
                    start: y_mean - slope * t_mean,
                    end: y_mean + slope * t_mean,
                }
            }
        }
    }

    /// Fit and subtract the trend in place, returning it.
    pub fn remove(series: &mut [f64]) -> Self {
        let trend = Self::fit(series);
        trend.apply(series, -1.0);
        trend
    }

    /// Add the trend back onto a series of any length.
    pub fn restore(&self, series: &mut [f64]) {
        self.apply(series, 1.0);
    }

    /// Slope per sample for a series of `n` samples.
    pub fn slope(&self, n: usize) -> f64 {
        if n < 2 {
            0.0
        } else {
            (self.end - self.start) / (n - 1) as f64
        }
    }

    /// Mean of several trends, end point by end point.
    pub fn mean<'a>(trends: impl IntoIterator<Item = &'a Trend>) -> Trend {
        let mut acc = Trend::default();
        let mut count = 0usize;
        for t in trends {
            acc.start += t.start;
            acc.end += t.end;
            count += 1;
        }
        if count > 0 {
            acc.start /= count as f64;
            acc.end /= count as f64;
        }
        acc
    }

    fn apply(&self, series: &mut [f64], sign: f64) {
        let slope = self.slope(series.len());
        for (t, y) in series.iter_mut().enumerate() {
            *y += sign * (self.start + slope * t as f64);
        }
    }
}

/// FFT processor for real signals of a fixed (padded) length
pub struct FftProcessor {
    /// FFT size
    size: usize,
    fft_forward: Arc<dyn Fft<f64>>,
    fft_inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftProcessor")
            .field("size", &self.size)
            .finish()
    }
}

impl FftProcessor {
    /// Create a new FFT processor for the given size
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        let fft_inverse = planner.plan_fft_inverse(size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        let scratch = vec![Complex64::new(0.0, 0.0); scratch_len];

        Self {
            size,
            fft_forward,
            fft_inverse,
            scratch,
        }
    }

    /// Get the FFT size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of one-sided bins, `size/2 + 1`.
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// One-sided forward transform of a real signal, zero-padded to `size`.
    pub fn forward_real(&mut self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&x| Complex64::new(x, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::new(0.0, 0.0));
        self.fft_forward
            .process_with_scratch(&mut buffer, &mut self.scratch);
        buffer.truncate(self.num_bins());
        buffer
    }

    /// Inverse of [`forward_real`](Self::forward_real).
    ///
    /// `half` holds up to `size/2 + 1` bins (missing bins are zero). The
    /// imaginary parts of the DC and Nyquist bins are ignored, so the result
    /// is exactly real.
    pub fn inverse_real(&mut self, half: &[Complex64]) -> Vec<f64> {
        let n = self.size;
        let nb = self.num_bins();
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        for (k, &x) in half.iter().take(nb).enumerate() {
            buffer[k] = x;
        }
        buffer[0].im = 0.0;
        if n % 2 == 0 && nb <= half.len() {
            buffer[n / 2].im = 0.0;
        }
        for k in 1..nb {
            let mirror = n - k;
            if mirror != k && mirror < n {
                buffer[mirror] = buffer[k].conj();
            }
        }
        self.fft_inverse
            .process_with_scratch(&mut buffer, &mut self.scratch);

        let scale = 1.0 / n as f64;
        buffer.iter().map(|c| c.re * scale).collect()
    }
}
