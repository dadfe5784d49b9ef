//! In-memory DIMM error database for a hardware-error monitoring daemon.
//!
//! Tracks corrected and uncorrected memory errors per DIMM, rate-limits
//! repeated errors with a decaying threshold, and runs a user-configured
//! trigger program when a threshold is crossed.
//!
//! Embedding:
//! - feed decoded memory errors to [`DimmTracker::record_error`]
//! - optionally prepopulate DIMM metadata from firmware inventory with
//!   [`DimmTracker::prefill`]
//! - dump the registry with [`DimmTracker::dump`] for status reporting

pub mod bucket;
pub mod config;
pub mod error;
pub mod firmware;
pub mod registry;
pub mod report;
pub mod tracker;
pub mod trigger;

pub use config::{ThresholdConfig, TrackerConfig};
pub use error::DimmWatchError;
pub use firmware::{FirmwareInventory, MemoryDeviceEntry};
pub use registry::{DimmKey, DimmRecord, DimmRegistry, ErrorCounter};
pub use report::DumpFlags;
pub use tracker::DimmTracker;
pub use trigger::{ProcessRunner, TriggerRunner};
