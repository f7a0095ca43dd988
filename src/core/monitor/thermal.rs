// Thermal pressure monitor. Linux derives a 0-100 severity from the SoC
// thermal zone in sysfs; Darwin rides the thermal-pressure notify channel
// and reports the kernel's own level. -1 means no sample yet.
use std::sync::atomic::{AtomicI32, Ordering};

use crate::core::monitor::{StartOnce, UNKNOWN_LEVEL};

/// Invoked from the monitor thread whenever the thermal level changes.
pub type ThermalCallback = Box<dyn Fn(i32) + Send + Sync>;

static STARTED: StartOnce = StartOnce::new();
static CURRENT: AtomicI32 = AtomicI32::new(UNKNOWN_LEVEL);

#[cfg(test)]
static SUBSCRIBE_CALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Starts thermal monitoring. Idempotent: later calls are no-ops and the
/// first registered callback stays in force until process exit.
pub fn start_thermal_monitoring(callback: ThermalCallback) {
    STARTED.start(move || {
        #[cfg(test)]
        SUBSCRIBE_CALLS.fetch_add(1, Ordering::SeqCst);
        subscribe(callback);
    });
}

/// Current thermal load: the last delivered level, or -1 before the first
/// underlying sample.
pub fn thermal_load() -> i32 {
    CURRENT.load(Ordering::SeqCst)
}

fn publish(value: i32, callback: &ThermalCallback) {
    CURRENT.store(value, Ordering::SeqCst);
    callback(value);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use super::{ThermalCallback, publish};
    use crate::core::monitor::{Sampler, spawn_watcher};
    use std::path::PathBuf;
    use std::time::Duration;

    const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";
    const POLL_INTERVAL: Duration = Duration::from_secs(2);

    // Severity band: nominal up to 45 C, saturated at 95 C, in steps of ten.
    const NOMINAL_C: i64 = 45;
    const CRITICAL_C: i64 = 95;

    pub(super) fn severity_from_millidegrees(milli: i64) -> i32 {
        let celsius = (milli / 1000).clamp(NOMINAL_C, CRITICAL_C);
        let scaled = ((celsius - NOMINAL_C) * 100 / (CRITICAL_C - NOMINAL_C)) as i32;
        scaled / 10 * 10
    }

    struct ZoneSampler {
        zone: PathBuf,
    }

    impl Sampler for ZoneSampler {
        type Value = i32;

        fn sample(&mut self) -> Option<i32> {
            let text = std::fs::read_to_string(&self.zone).ok()?;
            let milli: i64 = text.trim().parse().ok()?;
            Some(severity_from_millidegrees(milli))
        }
    }

    pub(super) fn subscribe(callback: ThermalCallback) {
        let zone = PathBuf::from(THERMAL_ZONE_PATH);
        if !zone.exists() {
            tracing::debug!(zone = THERMAL_ZONE_PATH, "thermal zone absent; no events");
        }
        spawn_watcher(
            "sysbridge-thermal",
            POLL_INTERVAL,
            ZoneSampler { zone },
            move |value| publish(value, &callback),
        );
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{CURRENT, ThermalCallback, publish};
    use crate::core::darwin::{NotifyChannel, THERMAL_PRESSURE_NOTIFY_NAME};
    use std::sync::atomic::Ordering;

    pub(super) fn subscribe(callback: ThermalCallback) {
        let channel = match NotifyChannel::open(THERMAL_PRESSURE_NOTIFY_NAME) {
            Ok(channel) => channel,
            Err(err) => {
                tracing::warn!(error = %err, "thermal notify channel unavailable");
                return;
            }
        };
        CURRENT.store(channel.state() as i32, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("sysbridge-thermal".into())
            .spawn(move || {
                while let Some(state) = channel.wait() {
                    publish(state as i32, &callback);
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "thermal monitor thread failed to start");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod platform {
    use super::ThermalCallback;

    pub(super) fn subscribe(_callback: ThermalCallback) {
        tracing::debug!("no thermal pressure source on this platform");
    }
}

use platform::subscribe;
