// Process-wide sleep-inhibition behavior through the public surface.
// Platform support is a property of the build target, so the expected
// answer is deterministic per platform and stable across nesting.
use sysbridge::core::sleep::{SleepSupport, pop_disable_sleep, push_disable_sleep};

#[cfg(target_os = "macos")]
const EXPECTED: SleepSupport = SleepSupport::Supported;
#[cfg(not(target_os = "macos"))]
const EXPECTED: SleepSupport = SleepSupport::Unsupported;

#[test]
fn nested_push_pop_is_balanced_and_deterministic() {
    assert_eq!(push_disable_sleep(), EXPECTED);
    assert_eq!(push_disable_sleep(), EXPECTED);
    assert_eq!(pop_disable_sleep(), EXPECTED);
    assert_eq!(pop_disable_sleep(), EXPECTED);

    // Repeating the cycle behaves identically: no state leaks out of a
    // balanced sequence.
    assert_eq!(push_disable_sleep(), EXPECTED);
    assert_eq!(pop_disable_sleep(), EXPECTED);
}
