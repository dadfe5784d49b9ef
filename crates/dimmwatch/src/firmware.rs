//! Firmware (SMBIOS/DMI) memory inventory boundary.
//!
//! Parsing the firmware tables themselves is the host's job; this module
//! defines the entry shape the tracker consumes and the bank-locator
//! pattern used to map entries onto DIMM identities.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DimmWatchError;

/// Opaque handle tying a registry record to the inventory entry its
/// firmware metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareRef(pub(crate) usize);

/// One memory-device entry from the firmware inventory.
#[derive(Debug, Clone)]
pub struct MemoryDeviceEntry {
    /// Bank locator string, e.g. `"NODE 1_Node0_Channel1_Dimm2"`.
    pub bank_locator: String,
    /// Device locator string, e.g. `"DIMM_A1"`.
    pub device_locator: String,
    /// Device name string.
    pub name: String,
}

/// Source of firmware memory inventory. Opening yields the full ordered
/// entry list; the sequence is finite and not restartable.
pub trait FirmwareInventory {
    fn open(&mut self) -> Result<Vec<MemoryDeviceEntry>, DimmWatchError>;
}

static BANK_LOCATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_Node(\d+)_Channel(\d+)_Dimm(\d+)").unwrap());

/// Parse `(socket, channel, slot)` out of a bank-locator string shaped like
/// `<prefix>_Node<N>_Channel<C>_Dimm<D>`. The match is anchored at the
/// first underscore so an unrelated vendor prefix is skipped; trailing text
/// after the slot number is ignored.
pub fn parse_bank_locator(bank_locator: &str) -> Option<(u32, u32, u32)> {
    let start = bank_locator.find('_').unwrap_or(bank_locator.len());
    let caps = BANK_LOCATOR.captures(&bank_locator[start..])?;
    let socket = caps[1].parse().ok()?;
    let channel = caps[2].parse().ok()?;
    let slot = caps[3].parse().ok()?;
    Some((socket, channel, slot))
}
