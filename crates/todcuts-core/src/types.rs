//! Core types shared by every scoring stage
//!
//! Spectra are stored as complex numbers: each frequency bin of a detector's
//! one-sided Fourier transform carries both amplitude and phase, and the
//! correlation between two detectors in a band is the (normalized) inner
//! product of their complex rows.
//!
//! ```text
//!               bins of the band
//!            low ───────────────▶ high
//!  det 0   [ x00  x01  x02  ...  x0k ]
//!  det 1   [ x10  x11  x12  ...  x1k ]     C = X · Xᴴ
//!   ...    [            ...          ]     cc[i][j] = C[i][j] / (|x_i| |x_j|)
//!  det n   [ xn0  xn1  xn2  ...  xnk ]
//! ```

use nalgebra::DMatrix;
use num_complex::Complex64;

/// Type alias for complex numbers using f64 precision
pub type Complex = Complex64;

/// Dense complex matrix, rows are detectors, columns are frequency bins.
pub type ComplexMatrix = DMatrix<Complex64>;

/// Boolean selection over detectors, always indexed over the full array.
pub type Mask = Vec<bool>;

/// Result type for scoring operations
pub type CutsResult<T> = Result<T, CutsError>;

/// Errors that can occur while scoring detectors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CutsError {
    /// Invalid or incomplete configuration. Fatal to the current analysis.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The input leaves a decomposition or fit mathematically undefined.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Too few samples: expected at least {expected}, got {actual}")]
    TooFewSamples { expected: usize, actual: usize },

    #[error("Band {low}..{high} exceeds spectrum with {bins} bins")]
    BandOutOfRange { low: usize, high: usize, bins: usize },
}

impl From<serde_json::Error> for CutsError {
    fn from(err: serde_json::Error) -> Self {
        CutsError::Configuration(err.to_string())
    }
}

/// Indices of the `true` entries of a mask.
pub fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| if m { Some(i) } else { None })
        .collect()
}

/// Number of `true` entries of a mask.
pub fn mask_count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

/// Spread values computed for a subset back onto the full detector range.
///
/// `indices[k]` receives `values[k]`; every other entry is `fill`.
pub fn scatter<T: Clone>(len: usize, indices: &[usize], values: &[T], fill: T) -> Vec<T> {
    let mut out = vec![fill; len];
    for (&i, v) in indices.iter().zip(values) {
        out[i] = v.clone();
    }
    out
}

/// Check a per-detector slice has one entry per detector.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> CutsResult<()> {
    if expected != actual {
        return Err(CutsError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Median of the finite values, `None` when there are none.
pub(crate) fn finite_median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some(0.5 * (v[mid - 1] + v[mid]))
    } else {
        Some(v[mid])
    }
}
