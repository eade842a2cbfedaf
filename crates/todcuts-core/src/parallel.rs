//! Parallel Batch Analysis
//!
//! Observations are independent, so a night of data is analyzed one
//! observation per rayon task. Each analysis stays single-threaded.
//! Enable with the `parallel` feature flag.
//!
//! ```toml
//! [dependencies]
//! todcuts-core = { version = "0.1", features = ["parallel"] }
//! ```

use rayon::prelude::*;
use tracing::info;

use crate::analysis::{analyze, ObservationInput, ObservationReport};
use crate::config::CutsConfig;
use crate::types::CutsResult;

/// Analyze every observation with the same configuration. Results keep the
/// input order; a failure in one observation does not stop the others.
pub fn analyze_batch(inputs: &[ObservationInput<'_>], config: &CutsConfig) -> Vec<CutsResult<ObservationReport>> {
    info!(observations = inputs.len(), threads = rayon::current_num_threads(), "Starting batch analysis");
    inputs.par_iter().map(|input| analyze(input, config)).collect()
}
