//! Leaky-bucket threshold accounting.
//!
//! Each error counter owns one bucket. Errors fill it; capacity units leak
//! away linearly over the configured age window. When the fill reaches
//! capacity the bucket reports a crossing, folds the fill into `excess`, and
//! starts over. The crossing decision made here is authoritative; the rest
//! of the crate never re-derives it.

use chrono::{DateTime, Utc};

use crate::config::ThresholdConfig;

/// Decaying per-counter threshold state.
#[derive(Debug, Clone, Default)]
pub struct BucketState {
    /// Current fill.
    pub count: u64,
    /// Fill folded out by past crossings.
    pub excess: u64,
    /// Instant of the last aging step.
    last_aged: Option<DateTime<Utc>>,
}

impl BucketState {
    /// True when the bucket has never accumulated anything.
    pub fn is_idle(&self) -> bool {
        self.count == 0 && self.excess == 0
    }

    /// Raw fill including folded-out excess.
    pub fn pressure(&self) -> u64 {
        self.count + self.excess
    }
}

/// Charge `delta` errors to the bucket at instant `at`. Returns true when
/// this charge crossed the threshold.
pub fn account(
    cfg: &ThresholdConfig,
    state: &mut BucketState,
    delta: u64,
    at: DateTime<Utc>,
) -> bool {
    if cfg.capacity == 0 || cfg.age_time_secs == 0 {
        return false;
    }
    age(cfg, state, at);
    state.count += delta;
    if state.count >= cfg.capacity {
        state.excess += state.count;
        state.count = 0;
        return true;
    }
    false
}

/// Leak fill proportional to the time elapsed since the last aging step.
/// Aging happens in whole-window granularity; sub-window elapsed time is
/// carried forward untouched.
fn age(cfg: &ThresholdConfig, state: &mut BucketState, at: DateTime<Utc>) {
    let last = match state.last_aged {
        Some(last) => last,
        None => {
            state.last_aged = Some(at);
            return;
        }
    };
    let elapsed = (at - last).num_seconds();
    if elapsed < i64::from(cfg.age_time_secs) {
        return;
    }
    let leaked = (elapsed as f64 / f64::from(cfg.age_time_secs) * cfg.capacity as f64) as u64;
    state.count = state.count.saturating_sub(leaked);
    state.last_aged = Some(at);
}

/// Human-readable summary of the bucket against its config, e.g. `"12 in 24h"`.
pub fn summarize(cfg: &ThresholdConfig, state: &BucketState) -> String {
    format!("{} in {}", state.pressure(), format_age(cfg.age_time_secs))
}

/// Coarse rendering of the age window. Not calendar-accurate.
fn format_age(secs: u32) -> String {
    if secs >= 86_400 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs >= 3_600 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
