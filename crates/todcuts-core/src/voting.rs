//! Multi-band vote aggregation
//!
//! Every band votes for the detectors it preselected. A detector survives
//! when it collects at least half the votes of the best-voted detector:
//!
//! ```text
//!  band 0: ■ ■ □ ■      votes: 3 3 1 2      max = 3
//!  band 1: ■ ■ □ □  ─▶                  ─▶  final: 2·votes ≥ 3  →  ■ ■ □ ■
//!  band 2: ■ ■ ■ ■
//! ```
//!
//! Gains are normalized per band to the mean gain of the surviving
//! preselected detectors, then combined across bands with the other
//! statistics. The aggregate does not depend on band order.

use serde::Serialize;
use tracing::{debug, warn};

use crate::correlation::BandScore;
use crate::types::{check_len, CutsError, CutsResult, Mask};

/// Band-combined statistics of every detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteSummary {
    /// Number of bands that preselected each detector.
    pub vote_count: Vec<usize>,
    pub final_mask: Mask,
    /// Normalized gains, one row per band in input order.
    pub band_gains: Vec<Vec<f64>>,
    /// Maximum correlation over the bands that preselected the detector.
    pub correlation: Vec<f64>,
    /// Mean normalized gain over the preselecting bands.
    pub gain: Vec<f64>,
    /// Mean norm over the preselecting bands.
    pub norm: Vec<f64>,
    /// Mean deprojection ratio over the preselecting bands.
    pub ratio: Vec<f64>,
}

impl VoteSummary {
    pub fn num_detectors(&self) -> usize {
        self.vote_count.len()
    }
}

/// Combine per-band scores into votes and aggregated statistics.
pub fn aggregate_votes(scores: &[BandScore]) -> CutsResult<VoteSummary> {
    let first = scores
        .first()
        .ok_or_else(|| CutsError::DegenerateInput("no band scores to aggregate".into()))?;
    let ndet = first.preselected.len();
    for score in scores {
        check_len("band score detectors", ndet, score.preselected.len())?;
    }

    let mut vote_count = vec![0usize; ndet];
    for score in scores {
        for (count, &p) in vote_count.iter_mut().zip(&score.preselected) {
            if p {
                *count += 1;
            }
        }
    }
    let max_votes = vote_count.iter().copied().max().unwrap_or(0);
    if max_votes == 0 {
        warn!(bands = scores.len(), "No detector preselected in any band");
    }
    let final_mask: Mask = vote_count.iter().map(|&c| 2 * c >= max_votes).collect();

    let band_gains: Vec<Vec<f64>> = scores
        .iter()
        .map(|score| normalized_gain(score, &final_mask))
        .collect();

    let mut correlation = vec![0.0; ndet];
    let mut gain = vec![0.0; ndet];
    let mut norm = vec![0.0; ndet];
    let mut ratio = vec![0.0; ndet];
    for d in 0..ndet {
        let votes = vote_count[d];
        if votes == 0 {
            continue;
        }
        let picked = || scores.iter().enumerate().filter(move |(_, s)| s.preselected[d]);
        correlation[d] = picked()
            .map(|(_, s)| s.correlation[d])
            .fold(f64::NEG_INFINITY, f64::max);
        gain[d] = picked().map(|(b, _)| band_gains[b][d]).sum::<f64>() / votes as f64;
        norm[d] = picked().map(|(_, s)| s.norm[d]).sum::<f64>() / votes as f64;
        ratio[d] = picked().map(|(_, s)| s.ratio[d]).sum::<f64>() / votes as f64;
    }

    debug!(
        bands = scores.len(),
        max_votes,
        selected = final_mask.iter().filter(|&&m| m).count(),
        "Aggregated band votes"
    );

    Ok(VoteSummary {
        vote_count,
        final_mask,
        band_gains,
        correlation,
        gain,
        norm,
        ratio,
    })
}

/// Gains of one band divided by the mean gain of its surviving preselected
/// detectors. A zero or non-finite mean leaves the gains unscaled.
fn normalized_gain(score: &BandScore, final_mask: &[bool]) -> Vec<f64> {
    let (sum, count) = score
        .gain
        .iter()
        .zip(&score.preselected)
        .zip(final_mask)
        .fold((0.0, 0usize), |(s, c), ((g, &p), &f)| {
            if p && f {
                (s + g, c + 1)
            } else {
                (s, c)
            }
        });
    let mean = if count > 0 { sum / count as f64 } else { f64::NAN };
    let scale = if mean.is_finite() && mean != 0.0 { mean } else { 1.0 };
    score
        .gain
        .iter()
        .map(|g| {
            let v = g / scale;
            if v.is_finite() {
                v
            } else {
                0.0
            }
        })
        .collect()
}
