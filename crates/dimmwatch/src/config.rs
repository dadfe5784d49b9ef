//! Tracker configuration.
//!
//! Values arrive already resolved from the host daemon's config file; the
//! serde derives let the host deserialize its `[dimm]` section straight into
//! these structs. Missing fields fall back to the documented defaults.

use serde::Deserialize;
use std::path::PathBuf;

/// Threshold configuration for one error class (corrected or uncorrected).
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Program to run when the threshold is crossed. `None` disables the
    /// trigger; crossings are still logged.
    #[serde(default)]
    pub trigger: Option<PathBuf>,

    /// Errors tolerated per age window before a crossing is reported.
    /// Zero disables threshold accounting for this class.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Length of the decay window in seconds. Zero disables accounting.
    #[serde(default = "default_age_time")]
    pub age_time_secs: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            trigger: None,
            capacity: default_capacity(),
            age_time_secs: default_age_time(),
        }
    }
}

/// Top-level configuration for the DIMM error tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Explicit tracking enable/disable. `None` defers to the hardware
    /// capability flag the daemon passes at construction.
    #[serde(default)]
    pub tracking_enabled: Option<bool>,

    /// Prepopulate the registry from firmware inventory before first use.
    #[serde(default = "default_true")]
    pub prepopulate: bool,

    /// Corrected-error thresholds.
    #[serde(default)]
    pub ce: ThresholdConfig,

    /// Uncorrected-error thresholds. Default tolerance is a single error
    /// per window; uncorrected errors are serious.
    #[serde(default = "default_uc_threshold")]
    pub uc: ThresholdConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_enabled: None,
            prepopulate: true,
            ce: ThresholdConfig::default(),
            uc: default_uc_threshold(),
        }
    }
}

fn default_capacity() -> u64 {
    10
}

fn default_age_time() -> u32 {
    // 24h window
    86_400
}

fn default_true() -> bool {
    true
}

fn default_uc_threshold() -> ThresholdConfig {
    ThresholdConfig {
        capacity: 1,
        ..ThresholdConfig::default()
    }
}
