//! Threshold-crossing alert dispatch.
//!
//! A crossing is always logged. If a trigger program is configured for the
//! error class, the dispatcher additionally builds a fixed-order environment
//! fact set describing the alert and hands it to the runner. Trigger
//! execution is fire-and-forget: nothing about the external program's
//! outcome flows back into the tracker.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bucket;
use crate::config::ThresholdConfig;
use crate::registry::{DimmRecord, ErrorCounter};

/// Upper bound on the environment fact set handed to the trigger program.
pub const MAX_ENV: usize = 20;

/// Fallback search path when the daemon inherited no PATH.
const FALLBACK_PATH: &str = "/sbin:/usr/sbin:/bin:/usr/bin";

/// Executes a configured trigger program. Implementations must not block
/// the caller on the program's completion.
pub trait TriggerRunner: Send {
    fn run(&self, path: &Path, env: &[(String, String)]);
}

/// Default runner: spawns the trigger as a child process with exactly the
/// given environment and detaches from it.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl TriggerRunner for ProcessRunner {
    fn run(&self, path: &Path, env: &[(String, String)]) {
        let spawned = Command::new(path)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .spawn();
        match spawned {
            Ok(mut child) => {
                // Reap the child off the event path.
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!("failed to run trigger {}: {}", path.display(), e),
        }
    }
}

/// Report a threshold crossing for one counter of one DIMM.
///
/// `event_time` is the instant of the specific event that crossed the
/// threshold, if one applies; lost-event crossings carry none.
pub fn dispatch(
    runner: &dyn TriggerRunner,
    message: &str,
    record: &DimmRecord,
    event_time: Option<DateTime<Utc>>,
    counter: &ErrorCounter,
    cfg: &ThresholdConfig,
) {
    let summary = bucket::summarize(cfg, &counter.bucket);
    let location = record.location();

    info!("{}: {}", message, summary);
    info!("Location {}", location);

    let trigger = match &cfg.trigger {
        Some(path) => path,
        None => return,
    };

    let mut env: Vec<(String, String)> = Vec::with_capacity(MAX_ENV);
    let mut fact = |key: &str, value: String| env.push((key.to_string(), value));

    fact(
        "PATH",
        std::env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string()),
    );
    fact("THRESHOLD", summary);
    fact("TOTALCOUNT", counter.total.to_string());
    fact("LOCATION", location);
    if let Some(label) = &record.location_label {
        fact("DMI_LOCATION", label.clone());
    }
    if let Some(name) = &record.display_name {
        fact("DMI_NAME", name.clone());
    }
    if record.key.slot != -1 {
        fact("DIMM", record.key.slot.to_string());
    }
    if record.key.channel != -1 {
        fact("CHANNEL", record.key.channel.to_string());
    }
    fact("SOCKETID", record.key.socket_id.to_string());
    fact("CECOUNT", record.ce.total.to_string());
    fact("UCCOUNT", record.uc.total.to_string());
    if let Some(t) = event_time {
        fact("LASTEVENT", t.timestamp().to_string());
    }
    fact("AGETIME", cfg.age_time_secs.to_string());
    fact("MESSAGE", message.to_string());
    fact("THRESHOLD_COUNT", counter.bucket.pressure().to_string());

    debug_assert!(env.len() <= MAX_ENV);
    runner.run(trigger, &env);
}
