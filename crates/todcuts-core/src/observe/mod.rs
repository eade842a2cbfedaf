//! # Observability
//!
//! Every stage reports through `tracing` events: band counts, preselection
//! fallbacks, skipped deprojections and degenerate fits. This module only
//! installs a subscriber for binaries and batch drivers that embed the
//! library; the library itself never installs one.
//!
//! ```rust,ignore
//! use todcuts_core::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production());
//! let report = todcuts_core::analysis::analyze(&input, &config)?;
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
