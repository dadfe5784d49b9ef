//! Textual dump of the DIMM registry.
//!
//! The format is consumed by downstream status tooling and must stay byte
//! stable: identity line, optional firmware metadata line, then a section
//! per error class, with blocks separated by exactly one blank line and no
//! trailing blank line.

use std::io::{self, Write};

use crate::bucket;
use crate::config::ThresholdConfig;
use crate::registry::{DimmRecord, DimmRegistry, ErrorCounter};

/// Verbosity switches for [`dump`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpFlags {
    /// Include records and sections with no recorded activity.
    pub all_records: bool,
    /// Include the firmware metadata line for records that have it.
    pub firmware_fields: bool,
}

/// Write every interesting record to `sink`, sorted by (socket, channel,
/// slot).
pub fn dump(
    registry: &DimmRegistry,
    sink: &mut dyn Write,
    flags: DumpFlags,
    ce_cfg: &ThresholdConfig,
    uc_cfg: &ThresholdConfig,
) -> io::Result<()> {
    let mut first = true;
    for record in registry.sorted_records() {
        if record.ce.total + record.uc.total == 0 && !flags.all_records {
            continue;
        }
        if !first {
            writeln!(sink)?;
        }
        first = false;
        dump_record(record, sink, flags, ce_cfg, uc_cfg)?;
    }
    Ok(())
}

fn dump_record(
    record: &DimmRecord,
    sink: &mut dyn Write,
    flags: DumpFlags,
    ce_cfg: &ThresholdConfig,
    uc_cfg: &ThresholdConfig,
) -> io::Result<()> {
    write!(sink, "SOCKET {}", record.key.socket_id)?;
    if record.key.channel == -1 {
        write!(sink, " CHANNEL unknown")?;
    } else {
        write!(sink, " CHANNEL {}", record.key.channel)?;
    }
    if record.key.slot == -1 {
        write!(sink, " DIMM unknown")?;
    } else {
        write!(sink, " DIMM {}", record.key.slot)?;
    }
    writeln!(sink)?;

    if flags.firmware_fields {
        dump_firmware_fields(record, sink)?;
    }
    dump_class(sink, "corrected memory errors", &record.ce, flags, ce_cfg)?;
    dump_class(sink, "uncorrected memory errors", &record.uc, flags, uc_cfg)?;
    Ok(())
}

/// `DMI_NAME "..." DMI_LOCATION "..."` on one line, whichever of the two
/// the record has. Nothing at all when it has neither.
fn dump_firmware_fields(record: &DimmRecord, sink: &mut dyn Write) -> io::Result<()> {
    let mut wrote = false;
    if let Some(name) = &record.display_name {
        write!(sink, "DMI_NAME \"{}\"", name)?;
        wrote = true;
    }
    if let Some(label) = &record.location_label {
        if wrote {
            write!(sink, " ")?;
        }
        write!(sink, "DMI_LOCATION \"{}\"", label)?;
        wrote = true;
    }
    if wrote {
        writeln!(sink)?;
    }
    Ok(())
}

fn dump_class(
    sink: &mut dyn Write,
    name: &str,
    counter: &ErrorCounter,
    flags: DumpFlags,
    cfg: &ThresholdConfig,
) -> io::Result<()> {
    let all = flags.all_records;
    if counter.total > 0 || counter.bucket.count > 0 || all {
        writeln!(sink, "{}:", name)?;
    }
    if counter.total > 0 || all {
        writeln!(sink, "\t{} total", counter.total)?;
    }
    // Only the live fill warrants a summary line; excess folded out by past
    // crossings does not refill the bucket.
    if counter.bucket.count > 0 || all {
        writeln!(sink, "\t{}", bucket::summarize(cfg, &counter.bucket))?;
    }
    Ok(())
}
