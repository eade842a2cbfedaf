//! Spectral front end
//!
//! Turns a block of detector time streams into the complex spectrum matrix
//! every scoring stage reads from:
//!
//! ```text
//! [D × T] real ──detrend──▶ pad T → nf (2·3·5-smooth) ──rFFT──▶ [D × (nf/2+1)] complex
//!                  │
//!                  └──▶ per-detector Trend, kept for re-trending
//! ```
//!
//! The bin width `df = 1/(dt·nf)` is fixed for the whole run.
//!
//! ## Example
//!
//! ```rust
//! use todcuts_core::spectral::Spectrum;
//!
//! let dt = 0.01;
//! let data: Vec<Vec<f64>> = (0..3)
//!     .map(|d| (0..500).map(|t| ((t + d) as f64 * 0.3).sin()).collect())
//!     .collect();
//! let spectrum = Spectrum::transform(&data, dt).unwrap();
//! assert_eq!(spectrum.num_detectors(), 3);
//! assert_eq!(spectrum.nf(), 500);
//! assert!((spectrum.df() - 1.0 / (dt * 500.0)).abs() < 1e-12);
//! ```

use nalgebra::DMatrix;
use tracing::debug;

use crate::bands::FrequencyBand;
use crate::fft_utils::{next_regular, FftProcessor, Trend};
use crate::types::{check_len, Complex, ComplexMatrix, CutsError, CutsResult};

/// One-sided spectra of every detector of a run.
#[derive(Debug, Clone)]
pub struct Spectrum {
    data: ComplexMatrix,
    trends: Vec<Trend>,
    dt: f64,
    df: f64,
    nf: usize,
    nsamps: usize,
}

impl Spectrum {
    /// Detrend and transform `data` (one row per detector) sampled every `dt`.
    pub fn transform(data: &[Vec<f64>], dt: f64) -> CutsResult<Self> {
        let nsamps = data.first().map(|row| row.len()).unwrap_or(0);
        if nsamps < 2 {
            return Err(CutsError::TooFewSamples {
                expected: 2,
                actual: nsamps,
            });
        }
        for row in data {
            check_len("time stream length", nsamps, row.len())?;
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(CutsError::Configuration(format!(
                "sample interval must be positive, got {}",
                dt
            )));
        }

        let nf = next_regular(nsamps);
        let mut fft = FftProcessor::new(nf);
        let nbins = fft.num_bins();
        let mut matrix = DMatrix::from_element(data.len(), nbins, Complex::new(0.0, 0.0));
        let mut trends = Vec::with_capacity(data.len());
        let mut buffer = vec![0.0; nsamps];

        for (d, row) in data.iter().enumerate() {
            buffer.copy_from_slice(row);
            trends.push(Trend::remove(&mut buffer));
            let spectrum = fft.forward_real(&buffer);
            for (k, x) in spectrum.into_iter().enumerate() {
                matrix[(d, k)] = x;
            }
        }

        let df = 1.0 / (dt * nf as f64);
        debug!(
            detectors = data.len(),
            nsamps,
            nf,
            df,
            "Transformed time streams"
        );

        Ok(Self {
            data: matrix,
            trends,
            dt,
            df,
            nf,
            nsamps,
        })
    }

    /// Transform using the sample interval implied by the timestamps,
    /// `dt = (t_last - t_first) / (T - 1)`.
    pub fn from_timestamps(data: &[Vec<f64>], ctime: &[f64]) -> CutsResult<Self> {
        let nsamps = data.first().map(|row| row.len()).unwrap_or(0);
        check_len("timestamps", nsamps, ctime.len())?;
        if ctime.len() < 2 {
            return Err(CutsError::TooFewSamples {
                expected: 2,
                actual: ctime.len(),
            });
        }
        let dt = (ctime[ctime.len() - 1] - ctime[0]) / (ctime.len() - 1) as f64;
        Self::transform(data, dt)
    }

    /// Build a spectrum directly from precomputed bins.
    pub fn from_parts(
        data: ComplexMatrix,
        trends: Vec<Trend>,
        dt: f64,
        nf: usize,
        nsamps: usize,
    ) -> CutsResult<Self> {
        check_len("trends", data.nrows(), trends.len())?;
        check_len("spectrum bins", nf / 2 + 1, data.ncols())?;
        if !(dt > 0.0) || nf == 0 {
            return Err(CutsError::Configuration(
                "sample interval and transform length must be positive".into(),
            ));
        }
        Ok(Self {
            data,
            trends,
            dt,
            df: 1.0 / (dt * nf as f64),
            nf,
            nsamps,
        })
    }

    pub fn num_detectors(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_bins(&self) -> usize {
        self.data.ncols()
    }

    /// Sample interval of the time streams.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Frequency bin width.
    pub fn df(&self) -> f64 {
        self.df
    }

    /// Padded transform length.
    pub fn nf(&self) -> usize {
        self.nf
    }

    /// Number of samples before padding.
    pub fn nsamps(&self) -> usize {
        self.nsamps
    }

    pub fn matrix(&self) -> &ComplexMatrix {
        &self.data
    }

    pub fn trends(&self) -> &[Trend] {
        &self.trends
    }

    /// Check `band` lies inside the spectrum.
    pub fn check_band(&self, band: &FrequencyBand) -> CutsResult<()> {
        if band.high > self.num_bins() || band.low >= band.high {
            return Err(CutsError::BandOutOfRange {
                low: band.low,
                high: band.high,
                bins: self.num_bins(),
            });
        }
        Ok(())
    }

    /// Rows `detectors`, columns `band.low..band.high`.
    pub fn slice(&self, detectors: &[usize], band: &FrequencyBand) -> CutsResult<ComplexMatrix> {
        self.check_band(band)?;
        Ok(DMatrix::from_fn(detectors.len(), band.len(), |r, c| {
            self.data[(detectors[r], band.low + c)]
        }))
    }
}

/// Time-domain reconstruction of band-limited frequency rows.
#[derive(Debug, Clone, Default)]
pub struct TimeDomainModes {
    /// One detrended waveform per input row.
    pub waveforms: Vec<Vec<f64>>,
    /// Trend removed from each waveform.
    pub trends: Vec<Trend>,
    /// Sample interval of the reconstructed waveforms.
    pub sample_interval: f64,
}

impl TimeDomainModes {
    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }

    /// Samples per waveform.
    pub fn num_samples(&self) -> usize {
        self.waveforms.first().map(|w| w.len()).unwrap_or(0)
    }
}

/// Inverse-transform each row of `fmodes`, placing its first column at bin
/// `offset`.
///
/// The reconstruction uses the shortest real transform holding
/// `offset + bins` one-sided bins, `n = 2·(offset + bins - 1)`, so its sample
/// interval is `1/(df·n)`. Each waveform is detrended.
pub fn time_domain_modes(fmodes: &ComplexMatrix, offset: usize, df: f64) -> TimeDomainModes {
    let rows = fmodes.nrows();
    let bins = fmodes.ncols();
    if rows == 0 || bins == 0 {
        return TimeDomainModes::default();
    }
    let n = (2 * (offset + bins - 1)).max(2);
    let mut fft = FftProcessor::new(n);
    let mut half = vec![Complex::new(0.0, 0.0); offset + bins];

    let mut waveforms = Vec::with_capacity(rows);
    let mut trends = Vec::with_capacity(rows);
    for r in 0..rows {
        for c in 0..bins {
            half[offset + c] = fmodes[(r, c)];
        }
        let mut wave = fft.inverse_real(&half);
        trends.push(Trend::remove(&mut wave));
        waveforms.push(wave);
    }

    TimeDomainModes {
        waveforms,
        trends,
        sample_interval: 1.0 / (df * n as f64),
    }
}
