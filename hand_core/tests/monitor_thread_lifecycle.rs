mod common;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hand_core::{HandBuilder, Telemetry, TelemetryMonitor};
use hand_traits::MonotonicClock;

fn wait_for_sample(monitor: &TelemetryMonitor) -> Option<Telemetry> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(t) = monitor.latest() {
            return Some(t);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    None
}

#[test]
fn monitor_reads_alongside_commands_and_joins_on_drop() {
    let (bus, sim) = common::sim();
    let hand = HandBuilder::new()
        .with_bus(bus)
        .with_config(common::config())
        .with_store(common::store_from(
            "[motor_limits.1]\nmin = -1.0\nmax = 1.0\n",
        ))
        .with_clock(MonotonicClock::new())
        .build()
        .unwrap();
    assert!(hand.connect().ok);
    hand.enable_torque(None).unwrap();

    let monitor = hand.monitor(Duration::from_millis(1));
    let sample = wait_for_sample(&monitor).expect("monitor produced a sample");
    assert_eq!(sample.temperatures, vec![30.0, 31.0, 32.0]);
    assert_eq!(sample.positions.len(), 3);

    // commands from this thread interleave with the monitor at gate granularity
    for i in 0..20 {
        let target = BTreeMap::from([("thumb_mcp".to_string(), 0.05 * f64::from(i))]);
        hand.set_joint_positions(&target).unwrap();
    }
    assert_eq!(sim.position_writes(), 20);
    assert_eq!(monitor.failures(), 0);

    let start = Instant::now();
    drop(monitor);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn monitor_counts_failures_while_disconnected() {
    let (bus, _sim) = common::sim();
    let hand = HandBuilder::new()
        .with_bus(bus)
        .with_config(common::config())
        .with_clock(MonotonicClock::new())
        .build()
        .unwrap();
    let monitor = hand.monitor(Duration::from_millis(1));
    let deadline = Instant::now() + Duration::from_secs(2);
    while monitor.failures() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(monitor.failures() > 0);
    assert!(monitor.latest().is_none());
}
