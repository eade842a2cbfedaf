//! Detector preselection from a band's correlation matrix
//!
//! Two methods pick the detectors that follow the dominant common mode of a
//! band, both working on `|cc|`, the magnitude of the normalized correlation
//! matrix restricted to the detectors being scored:
//!
//! - [`PreselMethod::Median`]: a detector is kept when its median correlation
//!   to the candidate set is high. If too few pass, a looser threshold is
//!   used; otherwise the selection is refined against the mean correlation to
//!   the first-pass set, excluding the detector's correlation with itself.
//! - [`PreselMethod::Groups`]: detectors are greedily grouped by mutual
//!   correlation and the largest coherent group is kept.
//!
//! The method is a closed enum; an unknown tag in a configuration file is a
//! parse error, never a runtime branch.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{mask_count, mask_indices};

/// Thresholds of the median preselection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MedianParams {
    /// Minimum correlation for preselection.
    pub min_corr: f64,
    /// Fallback threshold when `min_corr` keeps too few detectors.
    pub super_min_corr: f64,
    /// Minimum number of preselected detectors.
    pub min_sel: usize,
    /// At least `1/min_frac` of the detectors must pass before the fallback.
    pub min_frac: usize,
}

impl Default for MedianParams {
    fn default() -> Self {
        Self {
            min_corr: 0.6,
            super_min_corr: 0.3,
            min_sel: 10,
            min_frac: 10,
        }
    }
}

/// Thresholds of the grouping preselection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupParams {
    /// Starting threshold for seeding a group.
    pub init_corr: f64,
    /// Threshold down to which a seeded group keeps growing.
    pub group_corr: f64,
    /// Minimum mean internal correlation of an eligible dominant group.
    pub min_corr: f64,
    /// Threshold decrement.
    pub delta_corr: f64,
    /// Groups are only seeded while more than this many detectors remain.
    pub min_group_size: usize,
    /// Maximum number of seeded groups.
    pub max_groups: usize,
}

impl Default for GroupParams {
    fn default() -> Self {
        Self {
            init_corr: 0.99,
            group_corr: 0.8,
            min_corr: 0.6,
            delta_corr: 0.005,
            min_group_size: 20,
            max_groups: 5,
        }
    }
}

/// Preselection method, tagged by `"method"` in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PreselMethod {
    Median(MedianParams),
    Groups(GroupParams),
}

impl Default for PreselMethod {
    fn default() -> Self {
        PreselMethod::Median(MedianParams::default())
    }
}

/// Grouping of the scored detectors, indices local to the correlation matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectorGroups {
    /// Groups ordered by decreasing size.
    pub groups: Vec<Vec<usize>>,
    /// Index into `groups` of the preselected group.
    pub dominant: Option<usize>,
}

impl DetectorGroups {
    /// Group index of every detector, `None` for detectors left out.
    pub fn assignment(&self, n: usize) -> Vec<Option<usize>> {
        let mut out = vec![None; n];
        for (g, members) in self.groups.iter().enumerate() {
            for &i in members {
                out[i] = Some(g);
            }
        }
        out
    }
}

/// Outcome of a preselection.
#[derive(Debug, Clone, PartialEq)]
pub struct Preselection {
    /// One flag per row of the correlation matrix.
    pub selected: Vec<bool>,
    /// Group structure, for the grouping method only.
    pub groups: Option<DetectorGroups>,
}

impl PreselMethod {
    /// Run the preselection on `abs_cc` (`|cc|`, n × n) restricted to the
    /// candidates flagged in `candidates`.
    pub fn preselect(&self, abs_cc: &DMatrix<f64>, candidates: &[bool]) -> Preselection {
        match self {
            PreselMethod::Median(params) => Preselection {
                selected: presel_by_median(abs_cc, candidates, params),
                groups: None,
            },
            PreselMethod::Groups(params) => {
                let groups = group_detectors(abs_cc, candidates, params);
                let mut selected = vec![false; abs_cc.nrows()];
                if let Some(d) = groups.dominant {
                    for &i in &groups.groups[d] {
                        selected[i] = true;
                    }
                }
                Preselection {
                    selected,
                    groups: Some(groups),
                }
            }
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 0 {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    } else {
        values[n / 2]
    }
}

/// Median preselection.
pub fn presel_by_median(abs_cc: &DMatrix<f64>, candidates: &[bool], params: &MedianParams) -> Vec<bool> {
    let n = abs_cc.nrows();
    let cand = mask_indices(candidates);
    if cand.is_empty() {
        return vec![false; n];
    }

    let mut column = Vec::with_capacity(cand.len());
    let medians: Vec<f64> = (0..n)
        .map(|j| {
            column.clear();
            column.extend(cand.iter().map(|&i| abs_cc[(i, j)]));
            median(&mut column)
        })
        .collect();

    let first: Vec<bool> = (0..n)
        .map(|j| candidates[j] && medians[j] > params.min_corr)
        .collect();
    let passed = mask_count(&first);
    let required = (n as f64 / params.min_frac.max(1) as f64).max(params.min_sel as f64);

    if (passed as f64) < required {
        let fallback: Vec<bool> = (0..n)
            .map(|j| candidates[j] && medians[j] > params.super_min_corr)
            .collect();
        let kept = mask_count(&fallback);
        if kept < params.min_sel {
            warn!(
                kept,
                min_sel = params.min_sel,
                "Median preselection found too few correlated detectors"
            );
        } else {
            debug!(passed, kept, "Median preselection used fallback threshold");
        }
        return fallback;
    }

    let core = mask_indices(&first);
    let m = core.len() as f64;
    if core.len() < 2 {
        return first;
    }
    (0..n)
        .map(|j| {
            let mean = core.iter().map(|&i| abs_cc[(i, j)]).sum::<f64>() / m;
            candidates[j] && (mean - 1.0 / m) * m / (m - 1.0) > params.min_corr
        })
        .collect()
}

/// Greedy grouping of detectors by mutual correlation.
pub fn group_detectors(abs_cc: &DMatrix<f64>, candidates: &[bool], params: &GroupParams) -> DetectorGroups {
    let mut remaining = mask_indices(candidates);
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut thr = params.init_corr;
    let delta = params.delta_corr.max(1e-6);

    while !remaining.is_empty() {
        if remaining.len() <= params.min_group_size || groups.len() >= params.max_groups || thr <= 0.0 {
            groups.push(std::mem::take(&mut remaining));
            break;
        }

        // seed: detector with most neighbours above the threshold
        let (seed, neighbours) = remaining
            .iter()
            .map(|&j| {
                let count = remaining.iter().filter(|&&i| abs_cc[(i, j)] > thr).count();
                (j, count)
            })
            .fold((remaining[0], 0usize), |best, cur| if cur.1 > best.1 { cur } else { best });
        let needed = params.min_group_size.min(remaining.len() / 2);
        if neighbours < needed {
            thr -= delta;
            continue;
        }

        let mut group: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| abs_cc[(seed, i)] > thr)
            .collect();
        if group.is_empty() {
            thr -= delta;
            continue;
        }

        // grow while relaxing the threshold down to group_corr
        let mut t = thr;
        while t > params.group_corr {
            t -= delta;
            let outside: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|i| !group.contains(i))
                .collect();
            if outside.len() <= params.min_group_size {
                break;
            }
            let half = group.len() as f64 * 0.5;
            let joined: Vec<usize> = outside
                .into_iter()
                .filter(|&j| group.iter().filter(|&&i| abs_cc[(i, j)] > t).count() as f64 > half)
                .collect();
            group.extend(joined);
        }

        group.sort_unstable();
        remaining.retain(|i| !group.contains(i));
        debug!(size = group.len(), threshold = thr, "Seeded detector group");
        groups.push(group);
        thr = params.init_corr;
    }

    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    let dominant = groups
        .iter()
        .position(|g| mean_internal_correlation(abs_cc, g) >= params.min_corr);

    DetectorGroups { groups, dominant }
}

/// Mean off-diagonal `|cc|` inside a group; a single detector counts as
/// perfectly coherent.
fn mean_internal_correlation(abs_cc: &DMatrix<f64>, group: &[usize]) -> f64 {
    if group.len() < 2 {
        return 1.0;
    }
    let mut sum = 0.0;
    for &i in group {
        for &j in group {
            if i != j {
                sum += abs_cc[(i, j)];
            }
        }
    }
    sum / (group.len() * (group.len() - 1)) as f64
}
