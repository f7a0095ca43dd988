// Public-surface smoke for the monitor family: repeated starts are no-ops
// and the synchronous queries stay inside their contracts. The monitors
// keep running until the test process exits; that is the design.
use sysbridge::core::monitor::{
    SYSTEM_LOAD_ADVISORY_BAD, SYSTEM_LOAD_ADVISORY_GREAT, UNKNOWN_LEVEL,
    start_memory_pressure_monitoring, start_suspend_monitoring,
    start_system_load_advisory_monitoring, start_thermal_monitoring, system_load_advisory,
    thermal_load,
};

#[test]
fn monitors_tolerate_repeated_starts_and_queries_stay_in_range() {
    start_suspend_monitoring(Box::new(|_| {}));
    start_suspend_monitoring(Box::new(|_| {}));

    start_thermal_monitoring(Box::new(|_| {}));
    start_thermal_monitoring(Box::new(|_| {}));

    start_system_load_advisory_monitoring(Box::new(|_| {}));
    start_system_load_advisory_monitoring(Box::new(|_| {}));

    start_memory_pressure_monitoring(Box::new(|_| {}));
    start_memory_pressure_monitoring(Box::new(|_| {}));

    let thermal = thermal_load();
    assert!(
        thermal == UNKNOWN_LEVEL || (0..=100).contains(&thermal),
        "thermal load out of contract: {thermal}"
    );

    let advisory = system_load_advisory();
    assert!(
        advisory == UNKNOWN_LEVEL
            || (SYSTEM_LOAD_ADVISORY_BAD..=SYSTEM_LOAD_ADVISORY_GREAT).contains(&advisory),
        "load advisory out of contract: {advisory}"
    );
}
