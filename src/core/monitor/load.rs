// System load advisory monitor: a coarse contention signal, not a CPU
// percentage. Linux derives it from the 1-minute load average per core;
// Darwin rides the power-management SystemLoadAdvisory notify channel.
// The level numbering is a fixed contract: 1 bad, 2 ok, 3 great.
use std::sync::atomic::{AtomicI32, Ordering};

use crate::core::monitor::{StartOnce, UNKNOWN_LEVEL};

pub const SYSTEM_LOAD_ADVISORY_BAD: i32 = 1;
pub const SYSTEM_LOAD_ADVISORY_OK: i32 = 2;
pub const SYSTEM_LOAD_ADVISORY_GREAT: i32 = 3;

/// Invoked from the monitor thread whenever the advisory level changes.
pub type LoadAdvisoryCallback = Box<dyn Fn(i32) + Send + Sync>;

static STARTED: StartOnce = StartOnce::new();
static CURRENT: AtomicI32 = AtomicI32::new(UNKNOWN_LEVEL);

#[cfg(test)]
static SUBSCRIBE_CALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Starts load-advisory monitoring. Idempotent; the first registered
/// callback stays in force until process exit.
pub fn start_system_load_advisory_monitoring(callback: LoadAdvisoryCallback) {
    STARTED.start(move || {
        #[cfg(test)]
        SUBSCRIBE_CALLS.fetch_add(1, Ordering::SeqCst);
        subscribe(callback);
    });
}

/// Current advisory level: the last delivered value, or -1 before the
/// first underlying sample.
pub fn system_load_advisory() -> i32 {
    CURRENT.load(Ordering::SeqCst)
}

fn publish(value: i32, callback: &LoadAdvisoryCallback) {
    CURRENT.store(value, Ordering::SeqCst);
    callback(value);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use super::{LoadAdvisoryCallback, publish};
    use crate::core::monitor::{Sampler, spawn_watcher};
    use std::time::Duration;

    const LOADAVG_PATH: &str = "/proc/loadavg";
    const POLL_INTERVAL: Duration = Duration::from_secs(5);

    pub(super) fn parse_loadavg(text: &str) -> Option<f64> {
        text.split_whitespace().next()?.parse().ok()
    }

    pub(super) fn advisory_from_ratio(ratio: f64) -> i32 {
        if ratio > 1.0 {
            super::SYSTEM_LOAD_ADVISORY_BAD
        } else if ratio > 0.5 {
            super::SYSTEM_LOAD_ADVISORY_OK
        } else {
            super::SYSTEM_LOAD_ADVISORY_GREAT
        }
    }

    struct LoadSampler {
        cores: f64,
    }

    impl Sampler for LoadSampler {
        type Value = i32;

        fn sample(&mut self) -> Option<i32> {
            let text = std::fs::read_to_string(LOADAVG_PATH).ok()?;
            let load1 = parse_loadavg(&text)?;
            Some(advisory_from_ratio(load1 / self.cores))
        }
    }

    pub(super) fn subscribe(callback: LoadAdvisoryCallback) {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as f64;
        spawn_watcher(
            "sysbridge-load",
            POLL_INTERVAL,
            LoadSampler { cores },
            move |value| publish(value, &callback),
        );
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{CURRENT, LoadAdvisoryCallback, publish};
    use crate::core::darwin::{NotifyChannel, SYSTEM_LOAD_ADVISORY_NOTIFY_NAME};
    use std::sync::atomic::Ordering;

    pub(super) fn subscribe(callback: LoadAdvisoryCallback) {
        let channel = match NotifyChannel::open(SYSTEM_LOAD_ADVISORY_NOTIFY_NAME) {
            Ok(channel) => channel,
            Err(err) => {
                tracing::warn!(error = %err, "load advisory notify channel unavailable");
                return;
            }
        };
        CURRENT.store(channel.state() as i32, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("sysbridge-load".into())
            .spawn(move || {
                while let Some(state) = channel.wait() {
                    publish(state as i32, &callback);
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "load advisory thread failed to start");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod platform {
    use super::LoadAdvisoryCallback;

    pub(super) fn subscribe(_callback: LoadAdvisoryCallback) {
        tracing::debug!("no load advisory source on this platform");
    }
}

use platform::subscribe;

#[cfg(test)]
mod tests {
    use super::{
        SUBSCRIBE_CALLS, SYSTEM_LOAD_ADVISORY_BAD, SYSTEM_LOAD_ADVISORY_GREAT,
        SYSTEM_LOAD_ADVISORY_OK, publish, start_system_load_advisory_monitoring,
        system_load_advisory,
    };
    use crate::core::monitor::UNKNOWN_LEVEL;
    use std::sync::atomic::Ordering;

    #[test]
    fn advisory_levels_are_a_fixed_contract() {
        assert_eq!(SYSTEM_LOAD_ADVISORY_BAD, 1);
        assert_eq!(SYSTEM_LOAD_ADVISORY_OK, 2);
        assert_eq!(SYSTEM_LOAD_ADVISORY_GREAT, 3);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn loadavg_parses_and_classifies() {
        use super::platform::{advisory_from_ratio, parse_loadavg};

        let line = "0.42 0.61 0.73 2/1234 5678\n";
        let load1 = parse_loadavg(line).expect("parse");
        assert!((load1 - 0.42).abs() < 1e-9);
        assert!(parse_loadavg("garbage here").is_none());

        assert_eq!(advisory_from_ratio(1.5), SYSTEM_LOAD_ADVISORY_BAD);
        assert_eq!(advisory_from_ratio(0.75), SYSTEM_LOAD_ADVISORY_OK);
        assert_eq!(advisory_from_ratio(0.10), SYSTEM_LOAD_ADVISORY_GREAT);
    }

    // One test owns the process-wide monitor state.
    #[test]
    fn current_value_tracks_deliveries_and_start_is_idempotent() {
        assert_eq!(system_load_advisory(), UNKNOWN_LEVEL);

        let probe: super::LoadAdvisoryCallback = Box::new(|_| {});
        publish(SYSTEM_LOAD_ADVISORY_OK, &probe);
        assert_eq!(system_load_advisory(), SYSTEM_LOAD_ADVISORY_OK);

        start_system_load_advisory_monitoring(Box::new(|_| {}));
        start_system_load_advisory_monitoring(Box::new(|_| {}));
        assert_eq!(SUBSCRIBE_CALLS.load(Ordering::SeqCst), 1);
    }
}
