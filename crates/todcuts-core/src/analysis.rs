//! # Observation Analysis
//!
//! Runs every scoring stage over one observation and collects one record per
//! detector.
//!
//! ```text
//!  Spectrum ──▶ dark LF votes ──▶ dark modes ──▶ live LF votes (per frequency group)
//!     │                                              │
//!     ├──▶ slow modes (live, dark)                   │ preselection
//!     ├──▶ drift / mid-frequency errors ◀────────────┤
//!     ├──▶ high-frequency stats (live, dark) ◀───────┘
//!     └──▶ atmosphere fit (live ∪ dark, rms_live + rms_dark)
//! ```
//!
//! Stages that cannot produce a result for lack of detectors are skipped with
//! a warning and leave zeros in the detector records; configuration and shape
//! errors abort the analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::atm::{fit_atmosphere, AtmosphereModel};
use crate::bands::FrequencyBand;
use crate::common_mode::{extract_common_modes, CommonModes};
use crate::config::{CutsConfig, LowFreqConfig};
use crate::correlation::{score_band, BandInput};
use crate::drift::{drift_band, slow_common_mode, SlowMode};
use crate::fft_utils::next_regular;
use crate::high_freq::{high_freq_stats, HighFreqOptions, MomentTest, NoiseStats, ScanSegments};
use crate::spectral::Spectrum;
use crate::thermal::{summarize_thermometry, thermometry_spectra, ThermalSummary};
use crate::types::{check_len, mask_count, CutsError, CutsResult, Mask};
use crate::voting::{aggregate_votes, VoteSummary};

/// Detector catalog of one observation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorArray {
    pub live: Mask,
    pub dark: Mask,
    /// Detectors removed from both live and dark sets.
    #[serde(default)]
    pub excluded: Mask,
    /// Nominal observing frequency of each detector; zero means unknown.
    #[serde(default)]
    pub nominal_freq: Option<Vec<f64>>,
    /// Relative responsivity correction of each detector.
    #[serde(default)]
    pub flatfield: Option<Vec<f64>>,
}

impl DetectorArray {
    pub fn new(live: Mask, dark: Mask) -> Self {
        Self {
            live,
            dark,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn validate(&self, ndet: usize) -> CutsResult<()> {
        check_len("live mask", ndet, self.live.len())?;
        check_len("dark mask", ndet, self.dark.len())?;
        if !self.excluded.is_empty() {
            check_len("excluded mask", ndet, self.excluded.len())?;
        }
        if let Some(freq) = &self.nominal_freq {
            check_len("nominal frequencies", ndet, freq.len())?;
        }
        if let Some(ff) = &self.flatfield {
            check_len("flatfield", ndet, ff.len())?;
        }
        Ok(())
    }

    fn is_excluded(&self, d: usize) -> bool {
        self.excluded.get(d).copied().unwrap_or(false)
    }

    /// Live detectors that are not excluded.
    pub fn live_selection(&self) -> Mask {
        (0..self.len()).map(|d| self.live[d] && !self.is_excluded(d)).collect()
    }

    /// Dark detectors that are not excluded.
    pub fn dark_selection(&self) -> Mask {
        (0..self.len()).map(|d| self.dark[d] && !self.is_excluded(d)).collect()
    }

    /// Live detectors split by nominal frequency, or a single `"all"` group.
    fn frequency_groups(&self, live: &[bool], separate: bool) -> Vec<(String, Mask)> {
        let freq = match (&self.nominal_freq, separate) {
            (Some(freq), true) => freq,
            _ => return vec![("all".to_string(), live.to_vec())],
        };
        let mut groups: BTreeMap<i64, Mask> = BTreeMap::new();
        for (d, &f) in freq.iter().enumerate() {
            if live[d] && f != 0.0 && f.is_finite() {
                groups.entry(f.round() as i64).or_insert_with(|| vec![false; live.len()])[d] = true;
            }
        }
        groups.into_iter().map(|(f, mask)| (f.to_string(), mask)).collect()
    }
}

/// Scan parameters supplied by the scan analysis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParams {
    /// Mechanical scan frequency, Hz.
    pub scan_freq: f64,
    /// Scan half-cycle segmentation for partial statistics.
    #[serde(default)]
    pub segments: Option<ScanSegments>,
}

/// Everything one analysis reads.
#[derive(Debug, Clone, Copy)]
pub struct ObservationInput<'a> {
    pub spectrum: &'a Spectrum,
    pub detectors: &'a DetectorArray,
    pub scan: ScanParams,
    /// Housekeeping thermometer streams, same length as the detector data.
    pub thermometry: Option<&'a [Vec<f64>]>,
}

/// Vote summary of one nominal-frequency group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupVotes {
    pub label: String,
    pub members: Mask,
    pub votes: VoteSummary,
}

/// Low-frequency scores of a detector set, merged over frequency groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowFreqSummary {
    pub bands: Vec<FrequencyBand>,
    pub selected: Mask,
    pub correlation: Vec<f64>,
    pub gain: Vec<f64>,
    pub norm: Vec<f64>,
    pub ratio: Vec<f64>,
    pub groups: Vec<GroupVotes>,
}

impl LowFreqSummary {
    fn empty(ndet: usize, bands: Vec<FrequencyBand>) -> Self {
        Self {
            bands,
            selected: vec![false; ndet],
            correlation: vec![0.0; ndet],
            gain: vec![0.0; ndet],
            norm: vec![0.0; ndet],
            ratio: vec![0.0; ndet],
            groups: Vec::new(),
        }
    }

    fn merge(&mut self, label: String, members: Mask, votes: VoteSummary) {
        for d in (0..members.len()).filter(|&d| members[d]) {
            self.selected[d] = votes.final_mask[d];
            self.correlation[d] = votes.correlation[d];
            self.gain[d] = votes.gain[d];
            self.norm[d] = votes.norm[d];
            self.ratio[d] = votes.ratio[d];
        }
        self.groups.push(GroupVotes { label, members, votes });
    }
}

/// Final record of one detector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorReport {
    pub selected: bool,
    pub correlation: f64,
    pub gain: f64,
    pub norm: f64,
    pub rms: f64,
    pub skew: MomentTest,
    pub kurtosis: MomentTest,
    pub atm_exponent: f64,
    pub atm_level: f64,
    pub atm_knee: f64,
    pub drift_error: f64,
    pub mid_freq_error: f64,
    pub dark_ratio: f64,
}

/// Every stage output of one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationReport {
    pub dark: LowFreqSummary,
    pub live: LowFreqSummary,
    pub slow_mode: Option<SlowMode>,
    pub dark_slow_mode: Option<SlowMode>,
    pub drift_error: Vec<f64>,
    pub mid_freq_error: Vec<f64>,
    pub high_freq: NoiseStats,
    pub dark_rms: Vec<f64>,
    pub atmosphere: Option<AtmosphereModel>,
    pub thermal: Option<ThermalSummary>,
    pub detectors: Vec<DetectorReport>,
}

impl ObservationReport {
    pub fn num_selected(&self) -> usize {
        self.detectors.iter().filter(|d| d.selected).count()
    }
}

/// Band `[low, high)` with `high` clipped to the spectrum.
fn clipped_band(low: usize, high: usize, spectrum: &Spectrum) -> CutsResult<FrequencyBand> {
    FrequencyBand::new(low, high.min(spectrum.num_bins()))
}

/// Score every band over `selection` and vote. Bands without a usable
/// preselection are skipped; `None` when none is left.
fn vote_bands(
    spectrum: &Spectrum,
    selection: &[bool],
    bands: &[FrequencyBand],
    modes: &[CommonModes],
    scan_freq: f64,
    lf: &LowFreqConfig,
    scale: Option<&[f64]>,
) -> CutsResult<Option<VoteSummary>> {
    let mut scores = Vec::with_capacity(bands.len());
    for (i, band) in bands.iter().enumerate() {
        let input = BandInput {
            spectrum,
            selection,
            band: *band,
            scan_freq,
            modes: modes.get(i),
            scale,
        };
        match score_band(&input, &lf.scoring) {
            Ok(score) => scores.push(score),
            Err(CutsError::DegenerateInput(reason)) => {
                warn!(low = band.low, high = band.high, %reason, "Skipping band");
            }
            Err(e) => return Err(e),
        }
    }
    if scores.is_empty() {
        return Ok(None);
    }
    aggregate_votes(&scores).map(Some)
}

fn dark_stage(input: &ObservationInput<'_>, config: &CutsConfig, dark: &[bool]) -> CutsResult<LowFreqSummary> {
    let spectrum = input.spectrum;
    let lf = config.dark_low_freq();
    let bands = lf.range.partition(spectrum.df())?;
    let mut summary = LowFreqSummary::empty(spectrum.num_detectors(), bands);
    if mask_count(dark) == 0 {
        warn!("No dark detectors, skipping dark low-frequency analysis");
        return Ok(summary);
    }
    match vote_bands(spectrum, dark, &summary.bands, &[], input.scan.scan_freq, lf, None)? {
        Some(votes) => summary.merge("all".into(), dark.to_vec(), votes),
        None => warn!("No dark band could be scored"),
    }
    Ok(summary)
}

fn dark_modes(
    input: &ObservationInput<'_>,
    config: &CutsConfig,
    bands: &[FrequencyBand],
    dark_selected: &[bool],
) -> CutsResult<Vec<CommonModes>> {
    let spectrum = input.spectrum;
    let options = config.dark_modes.mode_options(config.low_freq.scoring.use_taper);
    let no_reference = vec![false; spectrum.num_detectors()];
    let reference: &[bool] = if config.dark_modes.use_darks {
        dark_selected
    } else {
        &no_reference
    };
    bands
        .iter()
        .map(|band| -> CutsResult<CommonModes> {
            let therm = match (config.dark_modes.use_therm, input.thermometry) {
                (true, Some(channels)) => Some(thermometry_spectra(channels, band, spectrum.nf())?),
                _ => None,
            };
            let modes = extract_common_modes(spectrum, reference, band, therm.as_ref(), &options)?;
            debug!(low = band.low, high = band.high, modes = modes.len(), "Dark modes");
            Ok(modes)
        })
        .collect()
}

fn live_stage(
    input: &ObservationInput<'_>,
    config: &CutsConfig,
    live: &[bool],
    dark_selected: &[bool],
) -> CutsResult<LowFreqSummary> {
    let spectrum = input.spectrum;
    let lf = &config.low_freq;
    let bands = lf.range.partition(spectrum.df())?;
    let modes = if config.remove_dark {
        dark_modes(input, config, &bands, dark_selected)?
    } else {
        Vec::new()
    };
    let flatfield = input.detectors.flatfield.as_deref();
    let mut summary = LowFreqSummary::empty(spectrum.num_detectors(), bands);

    for (label, members) in input.detectors.frequency_groups(live, config.separate_freqs) {
        if mask_count(&members) == 0 {
            continue;
        }
        let _span = info_span!("live_group", group = %label).entered();
        match vote_bands(spectrum, &members, &summary.bands, &modes, input.scan.scan_freq, lf, flatfield)? {
            Some(votes) => summary.merge(label, members, votes),
            None => warn!(group = %label, "No live band could be scored"),
        }
    }

    if let Some(ff) = flatfield {
        for (g, &f) in summary.gain.iter_mut().zip(ff) {
            if f != 0.0 && f.is_finite() {
                *g /= f.abs();
            }
        }
    }
    if !config.remove_dark {
        summary.ratio.iter_mut().for_each(|r| *r = 0.0);
    }
    Ok(summary)
}

fn optional_slow_mode(spectrum: &Spectrum, presel: &[bool], drift_filter: f64) -> CutsResult<Option<SlowMode>> {
    match slow_common_mode(spectrum, presel, drift_filter) {
        Ok(mode) => Ok(Some(mode)),
        Err(CutsError::DegenerateInput(reason)) => {
            debug!(%reason, "Skipping slow mode");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// High-frequency band: `[round(f0/df), round(f0/df) + nextRegular(width))`.
fn high_freq_band(spectrum: &Spectrum, filter: [f64; 2]) -> CutsResult<FrequencyBand> {
    let df = spectrum.df();
    let low = (filter[0] / df).round() as usize;
    let high = (filter[1] / df).round() as usize;
    clipped_band(low, low + next_regular(high.saturating_sub(low)), spectrum)
}

/// Run every stage over one observation.
pub fn analyze(input: &ObservationInput<'_>, config: &CutsConfig) -> CutsResult<ObservationReport> {
    config.validate()?;
    let spectrum = input.spectrum;
    let ndet = spectrum.num_detectors();
    input.detectors.validate(ndet)?;
    let live = input.detectors.live_selection();
    let dark = input.detectors.dark_selection();
    info!(
        detectors = ndet,
        live = mask_count(&live),
        dark = mask_count(&dark),
        bins = spectrum.num_bins(),
        "Analyzing observation"
    );

    let dark_lf = dark_stage(input, config, &dark)?;
    let live_lf = live_stage(input, config, &live, &dark_lf.selected)?;

    let drift_filter = config.drift.drift_filter;
    let slow_mode = optional_slow_mode(spectrum, &live_lf.selected, drift_filter)?;
    let dark_slow_mode = optional_slow_mode(spectrum, &dark_lf.selected, drift_filter)?;

    let drift = drift_band(spectrum, drift_filter)?;
    let drift_error = high_freq_stats(
        spectrum,
        &live,
        &drift,
        &HighFreqOptions {
            modes: config.drift.modes,
            preselected: Some(live_lf.selected.as_slice()),
            ..Default::default()
        },
    )?
    .rms;

    let df = spectrum.df();
    let mid = &config.mid_freq;
    let mid_band = clipped_band((mid.filter[0] / df) as usize, (mid.filter[1] / df) as usize, spectrum)?;
    let mid_freq_error = high_freq_stats(
        spectrum,
        &live,
        &mid_band,
        &HighFreqOptions {
            modes: mid.modes,
            preselected: Some(live_lf.selected.as_slice()),
            ..Default::default()
        },
    )?
    .rms;

    let hf = &config.high_freq;
    let hf_band = high_freq_band(spectrum, hf.filter)?;
    let segments = match (hf.get_partial, input.scan.segments) {
        (true, None) => {
            warn!("Partial statistics requested without scan segments");
            None
        }
        (true, segments) => segments,
        (false, _) => None,
    };
    let high_freq = high_freq_stats(
        spectrum,
        &live,
        &hf_band,
        &HighFreqOptions {
            modes: hf.live_modes,
            preselected: Some(live_lf.selected.as_slice()),
            high_order: true,
            segments,
        },
    )?;
    let dark_rms = high_freq_stats(
        spectrum,
        &dark,
        &hf_band,
        &HighFreqOptions {
            modes: hf.dark_modes,
            preselected: Some(dark_lf.selected.as_slice()),
            ..Default::default()
        },
    )?
    .rms;

    let atmosphere = if config.fit_power_law {
        let sel: Mask = (0..ndet).map(|d| live_lf.selected[d] || dark_lf.selected[d]).collect();
        let noise: Vec<f64> = high_freq.rms.iter().zip(&dark_rms).map(|(l, d)| l + d).collect();
        match fit_atmosphere(spectrum, &sel, &noise, input.scan.scan_freq, &config.atm_fit) {
            Ok(model) => Some(model),
            Err(CutsError::DegenerateInput(reason)) => {
                warn!(
                    fmin = config.atm_fit.fmin_a,
                    fmax = config.atm_fit.fmax_a,
                    %reason,
                    "Skipping atmosphere fit"
                );
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let thermal = match (&config.thermal_limits, input.thermometry) {
        (Some(limits), Some(channels)) => summarize_thermometry(channels, limits),
        _ => None,
    };

    let detectors = (0..ndet)
        .map(|d| {
            let lf = if dark[d] && !live[d] { &dark_lf } else { &live_lf };
            let mut report = DetectorReport {
                selected: lf.selected[d],
                correlation: lf.correlation[d],
                gain: lf.gain[d],
                norm: lf.norm[d],
                rms: high_freq.rms[d] + dark_rms[d],
                drift_error: drift_error[d],
                mid_freq_error: mid_freq_error[d],
                dark_ratio: live_lf.ratio[d],
                ..Default::default()
            };
            if let Some(skew) = &high_freq.skew {
                report.skew = skew[d];
            }
            if let Some(kurt) = &high_freq.kurtosis {
                report.kurtosis = kurt[d];
            }
            if let Some(atm) = &atmosphere {
                report.atm_exponent = atm.exponent[d];
                report.atm_level = atm.level[d];
                report.atm_knee = atm.knee[d];
            }
            report
        })
        .collect();

    let report = ObservationReport {
        dark: dark_lf,
        live: live_lf,
        slow_mode,
        dark_slow_mode,
        drift_error,
        mid_freq_error,
        high_freq,
        dark_rms,
        atmosphere,
        thermal,
        detectors,
    };
    info!(
        selected = report.num_selected(),
        live_selected = mask_count(&report.live.selected),
        dark_selected = mask_count(&report.dark.selected),
        "Observation analyzed"
    );
    Ok(report)
}
