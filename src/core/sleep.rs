// Process-wide sleep-inhibition stack. Push/pop pairs from arbitrary call
// sites share one depth counter; the OS block engages on 0->1 and releases
// on 1->0, with both transitions under the same lock so depth and assertion
// state never disagree for a concurrent observer.
use std::sync::Mutex;

/// Whether the platform honored a push/pop. `Unsupported` is a no-op for the
/// caller, not an error to propagate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SleepSupport {
    Supported,
    Unsupported,
}

pub(crate) trait SleepBackend {
    type Handle;

    fn supported(&self) -> bool;
    /// Engages the OS sleep block. None means the platform cannot.
    fn engage(&self) -> Option<Self::Handle>;
    fn release(&self, handle: Self::Handle);
}

pub(crate) struct SleepStack<B: SleepBackend> {
    backend: B,
    depth: u64,
    handle: Option<B::Handle>,
}

impl<B: SleepBackend> SleepStack<B> {
    pub(crate) const fn new(backend: B) -> Self {
        Self {
            backend,
            depth: 0,
            handle: None,
        }
    }

    pub(crate) fn push(&mut self) -> SleepSupport {
        if !self.backend.supported() {
            return SleepSupport::Unsupported;
        }
        if self.depth == 0 {
            match self.backend.engage() {
                Some(handle) => self.handle = Some(handle),
                None => return SleepSupport::Unsupported,
            }
        }
        self.depth += 1;
        SleepSupport::Supported
    }

    pub(crate) fn pop(&mut self) -> SleepSupport {
        if !self.backend.supported() {
            return SleepSupport::Unsupported;
        }
        if self.depth == 0 {
            // Unbalanced pop. Saturate rather than underflow; the caller
            // contract was violated but the process-wide state stays sane.
            tracing::warn!("pop_disable_sleep without a matching push; depth stays at zero");
            return SleepSupport::Supported;
        }
        self.depth -= 1;
        if self.depth == 0 {
            if let Some(handle) = self.handle.take() {
                self.backend.release(handle);
            }
        }
        SleepSupport::Supported
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> u64 {
        self.depth
    }
}

pub(crate) struct OsSleepBackend;

#[cfg(target_os = "macos")]
impl SleepBackend for OsSleepBackend {
    type Handle = crate::core::darwin::IOPMAssertionID;

    fn supported(&self) -> bool {
        true
    }

    fn engage(&self) -> Option<Self::Handle> {
        use crate::core::darwin;

        let assertion_type = darwin::cf_string(darwin::PREVENT_IDLE_SLEEP_ASSERTION)?;
        let Some(name) = darwin::cf_string("sysbridge active work") else {
            unsafe { darwin::CFRelease(assertion_type) };
            return None;
        };
        let mut id: darwin::IOPMAssertionID = 0;
        let rc = unsafe {
            darwin::IOPMAssertionCreateWithName(
                assertion_type,
                darwin::KIOPM_ASSERTION_LEVEL_ON,
                name,
                &mut id,
            )
        };
        unsafe {
            darwin::CFRelease(assertion_type);
            darwin::CFRelease(name);
        }
        if rc != darwin::KIO_RETURN_SUCCESS {
            tracing::warn!(rc, "power assertion creation failed");
            return None;
        }
        Some(id)
    }

    fn release(&self, handle: Self::Handle) {
        unsafe {
            crate::core::darwin::IOPMAssertionRelease(handle);
        }
    }
}

#[cfg(not(target_os = "macos"))]
impl SleepBackend for OsSleepBackend {
    type Handle = ();

    fn supported(&self) -> bool {
        false
    }

    fn engage(&self) -> Option<Self::Handle> {
        None
    }

    fn release(&self, _handle: Self::Handle) {}
}

static SLEEP_STACK: Mutex<SleepStack<OsSleepBackend>> =
    Mutex::new(SleepStack::new(OsSleepBackend));

/// Increments the inhibition depth, engaging the OS sleep block on the
/// 0->1 transition.
pub fn push_disable_sleep() -> SleepSupport {
    SLEEP_STACK.lock().expect("sleep stack mutex poisoned").push()
}

/// Decrements the inhibition depth, releasing the OS sleep block on the
/// 1->0 transition. Pops beyond pushes saturate at zero.
pub fn pop_disable_sleep() -> SleepSupport {
    SLEEP_STACK.lock().expect("sleep stack mutex poisoned").pop()
}

#[cfg(test)]
mod tests {
    use super::{SleepBackend, SleepStack, SleepSupport};
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Clone, Default)]
    struct CountingBackend {
        engaged: Arc<AtomicU64>,
        released: Arc<AtomicU64>,
    }

    impl SleepBackend for CountingBackend {
        type Handle = u64;

        fn supported(&self) -> bool {
            true
        }

        fn engage(&self) -> Option<Self::Handle> {
            Some(self.engaged.fetch_add(1, Ordering::SeqCst))
        }

        fn release(&self, _handle: Self::Handle) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Copy)]
    struct UnsupportedBackend;

    impl SleepBackend for UnsupportedBackend {
        type Handle = ();

        fn supported(&self) -> bool {
            false
        }

        fn engage(&self) -> Option<Self::Handle> {
            None
        }

        fn release(&self, _handle: Self::Handle) {}
    }

    #[test]
    fn nested_pushes_engage_and_release_once() {
        let backend = CountingBackend::default();
        let mut stack = SleepStack::new(backend.clone());

        assert_eq!(stack.push(), SleepSupport::Supported);
        assert_eq!(stack.push(), SleepSupport::Supported);
        assert_eq!(backend.engaged.load(Ordering::SeqCst), 1);
        assert_eq!(backend.released.load(Ordering::SeqCst), 0);

        assert_eq!(stack.pop(), SleepSupport::Supported);
        assert_eq!(backend.released.load(Ordering::SeqCst), 0);
        assert_eq!(stack.pop(), SleepSupport::Supported);
        assert_eq!(backend.engaged.load(Ordering::SeqCst), 1);
        assert_eq!(backend.released.load(Ordering::SeqCst), 1);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn unbalanced_pop_saturates_at_zero() {
        let backend = CountingBackend::default();
        let mut stack = SleepStack::new(backend.clone());

        assert_eq!(stack.pop(), SleepSupport::Supported);
        assert_eq!(stack.depth(), 0);
        assert_eq!(backend.released.load(Ordering::SeqCst), 0);

        // A later balanced pair still engages and releases normally.
        stack.push();
        stack.pop();
        assert_eq!(backend.engaged.load(Ordering::SeqCst), 1);
        assert_eq!(backend.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsupported_platform_is_a_no_op() {
        let mut stack = SleepStack::new(UnsupportedBackend);
        assert_eq!(stack.push(), SleepSupport::Unsupported);
        assert_eq!(stack.pop(), SleepSupport::Unsupported);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn concurrent_balanced_use_keeps_depth_and_counts_consistent() {
        let backend = CountingBackend::default();
        let stack = Arc::new(Mutex::new(SleepStack::new(backend.clone())));

        let threads = 8;
        let rounds = 1000;
        let mut handles = Vec::new();
        for _ in 0..threads {
            let stack = Arc::clone(&stack);
            handles.push(std::thread::spawn(move || {
                for _ in 0..rounds {
                    stack.lock().expect("lock").push();
                    stack.lock().expect("lock").pop();
                }
            }));
        }
        for handle in handles {
            handle.join().expect("join");
        }

        let stack = stack.lock().expect("lock");
        assert_eq!(stack.depth(), 0);
        assert_eq!(
            backend.engaged.load(Ordering::SeqCst),
            backend.released.load(Ordering::SeqCst)
        );
        assert!(backend.engaged.load(Ordering::SeqCst) >= 1);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn process_wide_stack_reports_unsupported_here() {
        assert_eq!(super::push_disable_sleep(), SleepSupport::Unsupported);
        assert_eq!(super::pop_disable_sleep(), SleepSupport::Unsupported);
    }
}
