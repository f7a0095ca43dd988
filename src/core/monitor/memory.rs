// Memory pressure monitor. Linux classifies the kernel's PSI averages;
// Darwin uses a memory-pressure dispatch source. Levels cross the host
// boundary as fixed integers and must never be renumbered.
use crate::core::monitor::StartOnce;

/// OS-classified severity of available-memory scarcity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum MemoryPressureLevel {
    Warning = 0,
    Critical = 1,
}

/// Invoked from the monitor thread whenever pressure is detected.
pub type MemoryPressureCallback = Box<dyn Fn(MemoryPressureLevel) + Send + Sync>;

static STARTED: StartOnce = StartOnce::new();

#[cfg(test)]
static SUBSCRIBE_CALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Starts memory-pressure monitoring. Idempotent; the first registered
/// callback stays in force until process exit.
pub fn start_memory_pressure_monitoring(callback: MemoryPressureCallback) {
    STARTED.start(move || {
        #[cfg(test)]
        SUBSCRIBE_CALLS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        subscribe(callback);
    });
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use super::{MemoryPressureCallback, MemoryPressureLevel};
    use crate::core::monitor::{Sampler, spawn_watcher};
    use std::path::Path;
    use std::time::Duration;

    const PRESSURE_PATH: &str = "/proc/pressure/memory";
    const POLL_INTERVAL: Duration = Duration::from_secs(2);

    // PSI thresholds on the 10-second averages. "some" is stalled-task
    // percentage; "full" means every non-idle task stalled at once.
    const SOME_WARNING_AVG10: f64 = 15.0;
    const SOME_CRITICAL_AVG10: f64 = 60.0;
    const FULL_CRITICAL_AVG10: f64 = 10.0;

    #[derive(Clone, Copy, Debug, PartialEq)]
    pub(super) struct PsiSample {
        pub(super) some_avg10: f64,
        pub(super) full_avg10: f64,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(super) enum PsiReading {
        Nominal,
        Warning,
        Critical,
    }

    pub(super) fn parse_pressure(text: &str) -> Option<PsiSample> {
        let mut some_avg10 = None;
        let mut full_avg10 = None;
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let which = fields.next()?;
            let avg10: f64 = fields
                .find_map(|field| field.strip_prefix("avg10="))?
                .parse()
                .ok()?;
            match which {
                "some" => some_avg10 = Some(avg10),
                "full" => full_avg10 = Some(avg10),
                _ => {}
            }
        }
        Some(PsiSample {
            some_avg10: some_avg10?,
            full_avg10: full_avg10.unwrap_or(0.0),
        })
    }

    pub(super) fn classify(sample: PsiSample) -> PsiReading {
        if sample.full_avg10 >= FULL_CRITICAL_AVG10 || sample.some_avg10 >= SOME_CRITICAL_AVG10 {
            PsiReading::Critical
        } else if sample.some_avg10 >= SOME_WARNING_AVG10 {
            PsiReading::Warning
        } else {
            PsiReading::Nominal
        }
    }

    struct PressureSampler;

    impl Sampler for PressureSampler {
        type Value = PsiReading;

        fn sample(&mut self) -> Option<PsiReading> {
            let text = std::fs::read_to_string(PRESSURE_PATH).ok()?;
            Some(classify(parse_pressure(&text)?))
        }
    }

    pub(super) fn subscribe(callback: MemoryPressureCallback) {
        if !Path::new(PRESSURE_PATH).exists() {
            tracing::debug!(
                path = PRESSURE_PATH,
                "pressure stall information absent; no events"
            );
        }
        spawn_watcher(
            "sysbridge-memory",
            POLL_INTERVAL,
            PressureSampler,
            move |reading| match reading {
                PsiReading::Warning => callback(MemoryPressureLevel::Warning),
                PsiReading::Critical => callback(MemoryPressureLevel::Critical),
                PsiReading::Nominal => {}
            },
        );
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{MemoryPressureCallback, MemoryPressureLevel};
    use crate::core::darwin;
    use std::os::raw::c_void;
    use std::sync::OnceLock;

    static CALLBACK: OnceLock<MemoryPressureCallback> = OnceLock::new();

    extern "C" fn on_pressure(context: *mut c_void) {
        let data = unsafe { darwin::dispatch_source_get_data(context) };
        let level = if data & darwin::DISPATCH_MEMORYPRESSURE_CRITICAL != 0 {
            MemoryPressureLevel::Critical
        } else if data & darwin::DISPATCH_MEMORYPRESSURE_WARN != 0 {
            MemoryPressureLevel::Warning
        } else {
            return;
        };
        if let Some(callback) = CALLBACK.get() {
            callback(level);
        }
    }

    pub(super) fn subscribe(callback: MemoryPressureCallback) {
        let _ = CALLBACK.set(callback);
        unsafe {
            let queue = darwin::dispatch_get_global_queue(0, 0);
            let source = darwin::dispatch_source_create(
                &raw const darwin::_dispatch_source_type_memorypressure,
                0,
                darwin::DISPATCH_MEMORYPRESSURE_WARN | darwin::DISPATCH_MEMORYPRESSURE_CRITICAL,
                queue,
            );
            if source.is_null() {
                tracing::warn!("memory pressure dispatch source unavailable");
                return;
            }
            darwin::dispatch_set_context(source, source);
            darwin::dispatch_source_set_event_handler_f(source, on_pressure);
            darwin::dispatch_resume(source);
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod platform {
    use super::MemoryPressureCallback;

    pub(super) fn subscribe(_callback: MemoryPressureCallback) {
        tracing::debug!("no memory pressure source on this platform");
    }
}

use platform::subscribe;
