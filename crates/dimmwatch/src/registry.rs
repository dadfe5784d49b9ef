//! The in-memory DIMM registry.
//!
//! One record per distinct (socket, channel, slot) triple ever observed.
//! Records are created on first reference and live for the rest of the
//! process; nothing ever removes one.

use std::collections::HashMap;

use crate::bucket::BucketState;
use crate::firmware::FirmwareRef;

/// Identity of one DIMM slot. A channel or slot of `-1` means the hardware
/// did not report that coordinate; it is a distinct identity in its own
/// right, not a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimmKey {
    pub socket_id: i32,
    pub channel: i32,
    pub slot: i32,
}

/// Running total and threshold state for one error class on one DIMM.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounter {
    pub total: u64,
    pub bucket: BucketState,
}

/// One tracked DIMM.
#[derive(Debug, Clone)]
pub struct DimmRecord {
    pub key: DimmKey,
    /// Corrected errors.
    pub ce: ErrorCounter,
    /// Uncorrected errors.
    pub uc: ErrorCounter,
    /// Human name from firmware inventory (device locator).
    pub display_name: Option<String>,
    /// Firmware bank locator string.
    pub location_label: Option<String>,
    /// Inventory entry the firmware metadata came from.
    pub firmware: Option<FirmwareRef>,
}

impl DimmRecord {
    fn new(key: DimmKey) -> Self {
        Self {
            key,
            ce: ErrorCounter::default(),
            uc: ErrorCounter::default(),
            display_name: None,
            location_label: None,
            firmware: None,
        }
    }

    /// Stable human-readable location, e.g.
    /// `SOCKET:0 CHANNEL:2 DIMM:0 [NODE 1_Node0_Channel2_Dimm0 DIMM_A1]`.
    /// Unreported coordinates render as `?`; the brackets are always
    /// present and hold whatever firmware metadata the record has.
    pub fn location(&self) -> String {
        let suffix = match (&self.location_label, &self.display_name) {
            (Some(label), Some(name)) => format!("{} {}", label, name),
            (Some(label), None) => label.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        };
        format!(
            "SOCKET:{} CHANNEL:{} DIMM:{} [{}]",
            self.key.socket_id,
            coord(self.key.channel),
            coord(self.key.slot),
            suffix
        )
    }
}

fn coord(v: i32) -> String {
    if v == -1 {
        "?".to_string()
    } else {
        v.to_string()
    }
}

/// Registry of every DIMM seen so far. Grows, never shrinks.
#[derive(Debug, Default)]
pub struct DimmRegistry {
    dimms: HashMap<DimmKey, DimmRecord>,
}

impl DimmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record for a DIMM, creating it on first reference.
    pub fn get_or_create(&mut self, socket_id: i32, channel: i32, slot: i32) -> &mut DimmRecord {
        let key = DimmKey {
            socket_id,
            channel,
            slot,
        };
        self.dimms.entry(key).or_insert_with(|| DimmRecord::new(key))
    }

    /// Number of records.
    pub fn count(&self) -> usize {
        self.dimms.len()
    }

    /// All records, in unspecified order.
    pub fn records(&self) -> impl Iterator<Item = &DimmRecord> {
        self.dimms.values()
    }

    /// All records sorted by (socket, channel, slot) ascending. Unreported
    /// coordinates (`-1`) sort before everything else.
    pub fn sorted_records(&self) -> Vec<&DimmRecord> {
        let mut records: Vec<_> = self.dimms.values().collect();
        records.sort_by_key(|r| r.key);
        records
    }
}
