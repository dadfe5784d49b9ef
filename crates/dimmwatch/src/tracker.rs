//! The tracker: event recording, firmware prefill, and dumping.
//!
//! Single-threaded by design; the host daemon serializes calls. The only
//! side effect that leaves the process is the trigger invocation, and that
//! is fire-and-forget.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::bucket;
use crate::config::TrackerConfig;
use crate::firmware::{self, FirmwareInventory, FirmwareRef};
use crate::registry::DimmRegistry;
use crate::report::{self, DumpFlags};
use crate::trigger::{self, ProcessRunner, TriggerRunner};

/// In-memory DIMM error tracker for a monitoring daemon.
pub struct DimmTracker {
    registry: DimmRegistry,
    config: TrackerConfig,
    enabled: bool,
    prefilled: bool,
    runner: Box<dyn TriggerRunner>,
}

impl DimmTracker {
    /// Build a tracker from resolved configuration. `memory_error_support`
    /// is the hardware capability flag; it decides tracking when the config
    /// does not set `tracking_enabled` explicitly.
    pub fn new(config: TrackerConfig, memory_error_support: bool) -> Self {
        Self::with_runner(config, memory_error_support, Box::new(ProcessRunner))
    }

    /// Like [`DimmTracker::new`] with a custom trigger runner.
    pub fn with_runner(
        config: TrackerConfig,
        memory_error_support: bool,
        runner: Box<dyn TriggerRunner>,
    ) -> Self {
        let enabled = config.tracking_enabled.unwrap_or(memory_error_support);
        Self {
            registry: DimmRegistry::new(),
            config,
            enabled,
            prefilled: false,
            runner,
        }
    }

    /// Whether error tracking is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of DIMMs seen so far.
    pub fn dimm_count(&self) -> usize {
        self.registry.count()
    }

    pub fn registry(&self) -> &DimmRegistry {
        &self.registry
    }

    /// Record one memory error event.
    ///
    /// `channel`/`slot` of `-1` mean the hardware did not narrow the error
    /// down to that coordinate. A `lost_count` of `n > 0` means `n`
    /// corrected errors were coalesced into this one notification by the
    /// reporting mechanism; the `n - 1` unseen ones are charged to the
    /// corrected counter regardless of the class of the event itself.
    /// `reported_at` is the event's own timestamp when it carries one;
    /// `None` falls back to the wall clock, resolved once for the whole
    /// call.
    pub fn record_error(
        &mut self,
        socket_id: i32,
        channel: i32,
        slot: i32,
        uncorrected: bool,
        lost_count: u64,
        reported_at: Option<DateTime<Utc>>,
    ) {
        if !self.enabled {
            return;
        }
        let at = reported_at.unwrap_or_else(Utc::now);
        let record = self.registry.get_or_create(socket_id, channel, slot);

        if lost_count > 1 {
            let lost = lost_count - 1;
            record.ce.total += lost;
            if bucket::account(&self.config.ce, &mut record.ce.bucket, lost, at) {
                let msg = format!(
                    "Lost DIMM memory error count {} exceeded threshold",
                    lost
                );
                // No single instant attaches to a coalesced batch.
                trigger::dispatch(
                    self.runner.as_ref(),
                    &msg,
                    record,
                    None,
                    &record.ce,
                    &self.config.ce,
                );
            }
        }

        if uncorrected {
            record.uc.total += 1;
            if bucket::account(&self.config.uc, &mut record.uc.bucket, 1, at) {
                trigger::dispatch(
                    self.runner.as_ref(),
                    "Uncorrected DIMM memory error count exceeded threshold",
                    record,
                    Some(at),
                    &record.uc,
                    &self.config.uc,
                );
            }
        } else {
            record.ce.total += 1;
            if bucket::account(&self.config.ce, &mut record.ce.bucket, 1, at) {
                trigger::dispatch(
                    self.runner.as_ref(),
                    "Corrected DIMM memory error count exceeded threshold",
                    record,
                    Some(at),
                    &record.ce,
                    &self.config.ce,
                );
            }
        }
    }

    /// Prepopulate the registry with DIMM metadata from firmware inventory.
    ///
    /// Latched: only the first call does anything. Best-effort on every
    /// path; an unavailable inventory or unparseable entries never fail the
    /// caller.
    pub fn prefill(&mut self, inventory: &mut dyn FirmwareInventory) {
        if self.prefilled {
            return;
        }
        if !self.enabled {
            return;
        }
        self.prefilled = true;
        if !self.config.prepopulate {
            return;
        }
        let entries = match inventory.open() {
            Ok(entries) => entries,
            Err(e) => {
                debug!("skipping DIMM prefill, firmware inventory unavailable: {}", e);
                return;
            }
        };

        let mut missed = 0usize;
        for (idx, entry) in entries.iter().enumerate() {
            let (socket, channel, slot) = match firmware::parse_bank_locator(&entry.bank_locator)
            {
                Some(parsed) => parsed,
                None => {
                    missed += 1;
                    continue;
                }
            };
            let record = self
                .registry
                .get_or_create(socket as i32, channel as i32, slot as i32);
            if record.firmware.is_some() {
                // Duplicate bank locator, most likely a parse ambiguity.
                // Keep the metadata already attached.
                missed += 1;
                continue;
            }
            record.firmware = Some(FirmwareRef(idx));
            record.location_label = Some(entry.bank_locator.clone());
            record.display_name = Some(entry.device_locator.clone());
        }
        if missed > 0 {
            warn!(
                "failed to prefill {} DIMM entries from firmware inventory",
                missed
            );
        }
    }

    /// Write the registry dump to `sink`. See [`crate::report`] for the
    /// format.
    pub fn dump(&self, sink: &mut dyn Write, flags: DumpFlags) -> io::Result<()> {
        report::dump(
            &self.registry,
            sink,
            flags,
            &self.config.ce,
            &self.config.uc,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdConfig;
    use crate::error::DimmWatchError;
    use crate::firmware::MemoryDeviceEntry;
    use chrono::TimeZone;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingRunner {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl TriggerRunner for RecordingRunner {
        fn run(&self, _path: &Path, env: &[(String, String)]) {
            let msg = env
                .iter()
                .find(|(k, _)| k == "MESSAGE")
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            self.messages.lock().unwrap().push(msg);
        }
    }

    struct FakeInventory {
        entries: Vec<MemoryDeviceEntry>,
        opens: usize,
        fail: bool,
    }

    impl FakeInventory {
        fn new(entries: Vec<MemoryDeviceEntry>) -> Self {
            Self {
                entries,
                opens: 0,
                fail: false,
            }
        }
    }

    impl FirmwareInventory for FakeInventory {
        fn open(&mut self) -> Result<Vec<MemoryDeviceEntry>, DimmWatchError> {
            self.opens += 1;
            if self.fail {
                return Err(DimmWatchError::Firmware("no SMBIOS tables".to_string()));
            }
            Ok(self.entries.clone())
        }
    }

    fn entry(bank: &str, device: &str) -> MemoryDeviceEntry {
        MemoryDeviceEntry {
            bank_locator: bank.to_string(),
            device_locator: device.to_string(),
            name: "Memory Device".to_string(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn enabled_config() -> TrackerConfig {
        TrackerConfig {
            tracking_enabled: Some(true),
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_counts_are_monotonic_per_class() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        for i in 0..5 {
            tracker.record_error(0, 1, 2, false, 0, Some(at(i)));
        }
        tracker.record_error(0, 1, 2, true, 0, Some(at(5)));

        let rec = tracker.registry().records().next().unwrap();
        assert_eq!(rec.ce.total, 5);
        assert_eq!(rec.uc.total, 1);
        assert_eq!(tracker.dimm_count(), 1);
    }

    #[test]
    fn test_lost_event_compensation_charges_ce() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        tracker.record_error(0, 1, 2, false, 5, Some(at(0)));

        let rec = tracker.registry().records().next().unwrap();
        // 4 lost + 1 primary.
        assert_eq!(rec.ce.total, 5);
        assert_eq!(rec.uc.total, 0);
    }

    #[test]
    fn test_lost_events_charge_ce_even_for_uncorrected_event() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        tracker.record_error(0, 1, 2, true, 3, Some(at(0)));

        let rec = tracker.registry().records().next().unwrap();
        assert_eq!(rec.ce.total, 2);
        assert_eq!(rec.uc.total, 1);
    }

    #[test]
    fn test_lost_count_of_one_adds_nothing_extra() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        tracker.record_error(0, 1, 2, false, 1, Some(at(0)));

        let rec = tracker.registry().records().next().unwrap();
        assert_eq!(rec.ce.total, 1);
    }

    #[test]
    fn test_disabled_tracker_records_nothing() {
        let config = TrackerConfig {
            tracking_enabled: Some(false),
            ..TrackerConfig::default()
        };
        let mut tracker = DimmTracker::new(config, true);
        tracker.record_error(0, 1, 2, true, 10, Some(at(0)));
        assert_eq!(tracker.dimm_count(), 0);
    }

    #[test]
    fn test_capability_flag_decides_when_config_is_silent() {
        let tracker = DimmTracker::new(TrackerConfig::default(), false);
        assert!(!tracker.is_enabled());
        let tracker = DimmTracker::new(TrackerConfig::default(), true);
        assert!(tracker.is_enabled());
        // Explicit setting wins over the capability flag.
        let config = TrackerConfig {
            tracking_enabled: Some(true),
            ..TrackerConfig::default()
        };
        let tracker = DimmTracker::new(config, false);
        assert!(tracker.is_enabled());
    }

    #[test]
    fn test_uc_crossing_fires_trigger() {
        let runner = RecordingRunner::default();
        let messages = runner.messages.clone();
        let mut config = enabled_config();
        config.uc = ThresholdConfig {
            trigger: Some("/usr/local/bin/dimm-alert".into()),
            capacity: 1,
            age_time_secs: 3600,
        };
        let mut tracker = DimmTracker::with_runner(config, true, Box::new(runner));

        tracker.record_error(0, 0, 0, true, 0, Some(at(0)));

        let messages = messages.lock().unwrap();
        assert_eq!(
            messages.as_slice(),
            ["Uncorrected DIMM memory error count exceeded threshold"]
        );
    }

    #[test]
    fn test_lost_crossing_message_carries_count() {
        let runner = RecordingRunner::default();
        let messages = runner.messages.clone();
        let mut config = enabled_config();
        config.ce = ThresholdConfig {
            trigger: Some("/usr/local/bin/dimm-alert".into()),
            capacity: 3,
            age_time_secs: 3600,
        };
        let mut tracker = DimmTracker::with_runner(config, true, Box::new(runner));

        // 7 lost corrected errors cross the CE threshold on their own.
        tracker.record_error(0, 0, 0, true, 8, Some(at(0)));

        let messages = messages.lock().unwrap();
        assert_eq!(
            messages.as_slice(),
            ["Lost DIMM memory error count 7 exceeded threshold"]
        );
    }

    #[test]
    fn test_prefill_attaches_metadata() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        let mut inv = FakeInventory::new(vec![
            entry("B0_Node0_Channel0_Dimm0", "DIMM_A0"),
            entry("B1_Node0_Channel1_Dimm0", "DIMM_B0"),
        ]);

        tracker.prefill(&mut inv);

        assert_eq!(tracker.dimm_count(), 2);
        let rec = tracker
            .registry()
            .records()
            .find(|r| r.key.channel == 1)
            .unwrap();
        assert_eq!(rec.display_name.as_deref(), Some("DIMM_B0"));
        assert_eq!(
            rec.location_label.as_deref(),
            Some("B1_Node0_Channel1_Dimm0")
        );
        assert!(rec.firmware.is_some());
    }

    #[test]
    fn test_prefill_is_latched() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        let mut inv = FakeInventory::new(vec![entry("B0_Node0_Channel0_Dimm0", "DIMM_A0")]);

        tracker.prefill(&mut inv);
        tracker.prefill(&mut inv);

        assert_eq!(inv.opens, 1);
        assert_eq!(tracker.dimm_count(), 1);
    }

    #[test]
    fn test_prefill_keeps_existing_metadata_on_duplicate() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        let mut inv = FakeInventory::new(vec![
            entry("B0_Node0_Channel0_Dimm0", "DIMM_A0"),
            entry("B0_Node0_Channel0_Dimm0", "DIMM_IMPOSTOR"),
        ]);

        tracker.prefill(&mut inv);

        assert_eq!(tracker.dimm_count(), 1);
        let rec = tracker.registry().records().next().unwrap();
        assert_eq!(rec.display_name.as_deref(), Some("DIMM_A0"));
    }

    #[test]
    fn test_prefill_skips_unparseable_entries() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        let mut inv = FakeInventory::new(vec![
            entry("BANK 0", "DIMM_A0"),
            entry("B0_Node1_Channel2_Dimm3", "DIMM_C3"),
        ]);

        tracker.prefill(&mut inv);

        assert_eq!(tracker.dimm_count(), 1);
        let rec = tracker.registry().records().next().unwrap();
        assert_eq!(rec.key.socket_id, 1);
        assert_eq!(rec.key.channel, 2);
        assert_eq!(rec.key.slot, 3);
    }

    #[test]
    fn test_prefill_survives_inventory_failure() {
        let mut tracker = DimmTracker::new(enabled_config(), true);
        let mut inv = FakeInventory::new(vec![]);
        inv.fail = true;

        tracker.prefill(&mut inv);
        assert_eq!(tracker.dimm_count(), 0);
    }

    #[test]
    fn test_prefill_respects_prepopulate_flag() {
        let config = TrackerConfig {
            tracking_enabled: Some(true),
            prepopulate: false,
            ..TrackerConfig::default()
        };
        let mut tracker = DimmTracker::new(config, true);
        let mut inv = FakeInventory::new(vec![entry("B0_Node0_Channel0_Dimm0", "DIMM_A0")]);

        tracker.prefill(&mut inv);
        assert_eq!(inv.opens, 0);
        assert_eq!(tracker.dimm_count(), 0);
    }

    #[test]
    fn test_prefill_disabled_tracking_does_not_latch() {
        let config = TrackerConfig {
            tracking_enabled: Some(false),
            ..TrackerConfig::default()
        };
        let mut tracker = DimmTracker::new(config, true);
        let mut inv = FakeInventory::new(vec![entry("B0_Node0_Channel0_Dimm0", "DIMM_A0")]);

        tracker.prefill(&mut inv);
        assert_eq!(inv.opens, 0);
        assert_eq!(tracker.dimm_count(), 0);
    }
}
