// Suspend/resume monitor: observes job-control stop/continue signals on
// every UNIX, plus system sleep/wake power notifications on Darwin. Reason
// values cross the host boundary as fixed integers and must never be
// renumbered.
use std::sync::Arc;

use signal_hook::consts::{SIGCONT, SIGTSTP};
use signal_hook::iterator::Signals;

use crate::core::monitor::StartOnce;

/// Why a suspension callback fired.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum SuspensionReason {
    /// Job-control stop (SIGTSTP observed).
    Stopped = 0,
    /// Job-control continue (SIGCONT observed).
    Continued = 1,
    /// The system is about to sleep.
    SleepEntry = 2,
    /// The system woke from sleep.
    Wake = 3,
}

/// Invoked from the monitor thread on every suspension event.
pub type SuspendCallback = Box<dyn Fn(SuspensionReason) + Send + Sync>;

static STARTED: StartOnce = StartOnce::new();

#[cfg(test)]
static SUBSCRIBE_CALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Starts suspend/resume monitoring. Idempotent; the first registered
/// callback stays in force until process exit.
pub fn start_suspend_monitoring(callback: SuspendCallback) {
    STARTED.start(move || {
        #[cfg(test)]
        SUBSCRIBE_CALLS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        subscribe(callback);
    });
}

fn subscribe(callback: SuspendCallback) {
    let callback = Arc::new(callback);
    #[cfg(target_os = "macos")]
    darwin_power::watch(Arc::clone(&callback));
    watch_signals(callback);
}

// Observing SIGTSTP installs a handler, so the process records the stop
// instead of being stopped by the default action.
fn watch_signals(callback: Arc<SuspendCallback>) {
    let mut signals = match Signals::new([SIGTSTP, SIGCONT]) {
        Ok(signals) => signals,
        Err(err) => {
            tracing::warn!(error = %err, "cannot observe stop/continue signals");
            return;
        }
    };
    let spawned = std::thread::Builder::new()
        .name("sysbridge-suspend".into())
        .spawn(move || {
            for signal in signals.forever() {
                let reason = match signal {
                    SIGTSTP => SuspensionReason::Stopped,
                    SIGCONT => SuspensionReason::Continued,
                    _ => continue,
                };
                (*callback)(reason);
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "suspend monitor thread failed to start");
    }
}

#[cfg(target_os = "macos")]
mod darwin_power {
    use super::{SuspendCallback, SuspensionReason};
    use crate::core::darwin;
    use std::os::raw::{c_long, c_void};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, OnceLock};

    static CALLBACK: OnceLock<Arc<SuspendCallback>> = OnceLock::new();
    static ROOT_PORT: AtomicU32 = AtomicU32::new(0);

    extern "C" fn on_power_message(
        _refcon: *mut c_void,
        _service: darwin::IoObject,
        message_type: u32,
        argument: *mut c_void,
    ) {
        match message_type {
            darwin::KIO_MESSAGE_CAN_SYSTEM_SLEEP => allow(argument),
            darwin::KIO_MESSAGE_SYSTEM_WILL_SLEEP => {
                emit(SuspensionReason::SleepEntry);
                // The kernel blocks the sleep transition until every
                // interested client acknowledges it.
                allow(argument);
            }
            darwin::KIO_MESSAGE_SYSTEM_HAS_POWERED_ON => emit(SuspensionReason::Wake),
            _ => {}
        }
    }

    fn emit(reason: SuspensionReason) {
        if let Some(callback) = CALLBACK.get() {
            (**callback)(reason);
        }
    }

    fn allow(argument: *mut c_void) {
        let port = ROOT_PORT.load(Ordering::SeqCst);
        if port != 0 {
            unsafe {
                darwin::IOAllowPowerChange(port, argument as c_long);
            }
        }
    }

    pub(super) fn watch(callback: Arc<SuspendCallback>) {
        let _ = CALLBACK.set(callback);
        let spawned = std::thread::Builder::new()
            .name("sysbridge-power".into())
            .spawn(|| unsafe {
                let mut port: darwin::IONotificationPortRef = std::ptr::null_mut();
                let mut notifier: darwin::IoObject = 0;
                let root = darwin::IORegisterForSystemPower(
                    std::ptr::null_mut(),
                    &mut port,
                    on_power_message,
                    &mut notifier,
                );
                if root == 0 {
                    tracing::warn!("power registration failed; sleep/wake events unavailable");
                    return;
                }
                ROOT_PORT.store(root, Ordering::SeqCst);
                let source = darwin::IONotificationPortGetRunLoopSource(port);
                darwin::CFRunLoopAddSource(
                    darwin::CFRunLoopGetCurrent(),
                    source,
                    darwin::kCFRunLoopDefaultMode,
                );
                darwin::CFRunLoopRun();
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "power watch thread failed to start");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SUBSCRIBE_CALLS, SuspensionReason, start_suspend_monitoring};
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn reason_numbering_is_a_fixed_contract() {
        assert_eq!(SuspensionReason::Stopped as i32, 0);
        assert_eq!(SuspensionReason::Continued as i32, 1);
        assert_eq!(SuspensionReason::SleepEntry as i32, 2);
        assert_eq!(SuspensionReason::Wake as i32, 3);
    }

    // One test owns the process-wide monitor state: double-start keeps a
    // single subscription, and a real SIGCONT reaches the first callback.
    #[test]
    fn start_is_idempotent_and_sigcont_is_delivered() {
        let (tx, rx) = mpsc::channel();
        start_suspend_monitoring(Box::new(move |reason| {
            let _ = tx.send(reason);
        }));
        start_suspend_monitoring(Box::new(|_| {}));
        assert_eq!(SUBSCRIBE_CALLS.load(Ordering::SeqCst), 1);

        unsafe {
            libc::raise(libc::SIGCONT);
        }
        let reason = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("continue event");
        assert_eq!(reason, SuspensionReason::Continued);
    }
}
