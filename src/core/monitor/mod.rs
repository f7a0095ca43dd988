// Shared machinery for the system-condition monitors. Each monitor is a
// process-wide UNSTARTED -> ACTIVE state machine: started at most once,
// never stopped, callbacks delivered from a layer-owned thread.
use std::sync::OnceLock;
use std::time::Duration;

pub mod load;
pub mod memory;
pub mod suspend;
pub mod thermal;

pub use load::{
    SYSTEM_LOAD_ADVISORY_BAD, SYSTEM_LOAD_ADVISORY_GREAT, SYSTEM_LOAD_ADVISORY_OK,
    start_system_load_advisory_monitoring, system_load_advisory,
};
pub use memory::{MemoryPressureLevel, start_memory_pressure_monitoring};
pub use suspend::{SuspensionReason, start_suspend_monitoring};
pub use thermal::{start_thermal_monitoring, thermal_load};

/// Sentinel for the synchronous queries before any sample exists.
pub const UNKNOWN_LEVEL: i32 = -1;

/// Idempotent UNSTARTED -> ACTIVE guard. The first call runs `init`; every
/// later call is a no-op and the first registration stays in force.
pub(crate) struct StartOnce(OnceLock<()>);

impl StartOnce {
    pub(crate) const fn new() -> Self {
        Self(OnceLock::new())
    }

    pub(crate) fn start(&self, init: impl FnOnce()) {
        self.0.get_or_init(|| {
            init();
        });
    }
}

/// One reading from a platform sampler. None means the source could not be
/// read this round; the watcher keeps polling.
pub(crate) trait Sampler: Send + 'static {
    type Value: Copy + PartialEq + Send + 'static;

    fn sample(&mut self) -> Option<Self::Value>;
}

/// Spawns the polling thread behind a monitor: samples on `interval` and
/// hands every *changed* value to `deliver`. The thread runs until process
/// exit; there is no stop operation in this design.
pub(crate) fn spawn_watcher<S, F>(name: &'static str, interval: Duration, mut sampler: S, mut deliver: F)
where
    S: Sampler,
    F: FnMut(S::Value) + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut last = None;
            loop {
                if let Some(value) = sampler.sample() {
                    if last != Some(value) {
                        last = Some(value);
                        deliver(value);
                    }
                }
                std::thread::sleep(interval);
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(monitor = name, error = %err, "monitor thread failed to start");
    }
}

#[cfg(test)]
mod tests {
    use super::{Sampler, StartOnce, spawn_watcher};
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ScriptedSampler {
        script: VecDeque<Option<i32>>,
    }

    impl Sampler for ScriptedSampler {
        type Value = i32;

        fn sample(&mut self) -> Option<i32> {
            self.script.pop_front().flatten()
        }
    }

    #[test]
    fn start_once_runs_init_a_single_time() {
        let guard = StartOnce::new();
        let mut runs = 0;
        guard.start(|| runs += 1);
        guard.start(|| runs += 10);
        assert_eq!(runs, 1);
    }

    #[test]
    fn watcher_delivers_changes_and_skips_repeats_and_gaps() {
        let script = [Some(1), Some(1), None, Some(2), Some(2), Some(3)]
            .into_iter()
            .collect();
        let (tx, rx) = mpsc::channel();
        spawn_watcher(
            "sysbridge-test-watcher",
            Duration::from_millis(1),
            ScriptedSampler { script },
            move |value| {
                let _ = tx.send(value);
            },
        );

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).expect("first"), 1);
        assert_eq!(rx.recv_timeout(timeout).expect("second"), 2);
        assert_eq!(rx.recv_timeout(timeout).expect("third"), 3);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
