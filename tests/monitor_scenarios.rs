//! Equipment monitor scenarios through the public library API.
//!
//! Each test drives a monitor the way the pipeline does: ingest a sample,
//! then run a transitions-only evaluation, and counts the alerts that come
//! out.

use chrono::{DateTime, Duration, TimeZone, Utc};

use engine_room::config::{EngineConfig, PumpConfig, TankConfig};
use engine_room::monitor::{
    DebounceGate, EngineMonitor, Monitor, PumpMonitor, ReplayedHistory, RpmBand, TankMonitor,
    ThresholdMap,
};
use engine_room::types::{AlarmState, Evaluation, LogEventType, Sample};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap() + Duration::seconds(secs)
}

/// Minimal recorder of what a monitor emitted.
#[derive(Default)]
struct Emitted {
    evaluations: Vec<Evaluation>,
}

impl Emitted {
    fn push(&mut self, evals: Vec<Evaluation>) -> usize {
        let n = evals.len();
        self.evaluations.extend(evals);
        n
    }

    fn alerts_in_state(&self, state: &str) -> usize {
        self.evaluations
            .iter()
            .filter_map(|e| e.alert.as_ref())
            .filter(|a| a.state == state)
            .count()
    }

    fn alerts_with_alarm(&self, alarm: AlarmState) -> usize {
        self.evaluations
            .iter()
            .filter_map(|e| e.alert.as_ref())
            .filter(|a| a.alarm == alarm)
            .count()
    }
}

fn step(monitor: &mut dyn Monitor, sample: Sample, out: &mut Emitted) {
    let now = sample.timestamp;
    monitor.ingest(&sample);
    out.push(monitor.evaluate(now, true));
}

// ============================================================================
// Primitives
// ============================================================================

#[test]
fn test_threshold_map_is_monotonic_across_range() {
    let map = ThresholdMap::new(
        RpmBand::Off,
        vec![
            (RpmBand::Slow, 100.0),
            (RpmBand::Normal, 800.0),
            (RpmBand::Fast, 2200.0),
            (RpmBand::TooFast, 2500.0),
        ],
    )
    .unwrap();

    let mut previous = map.classify(-50.0);
    for rpm in (-50..3000).step_by(25) {
        let band = map.classify(rpm as f64);
        assert!(band >= previous, "{} classified {:?} after {:?}", rpm, band, previous);
        previous = band;
    }
}

#[test]
fn test_debounce_commits_on_nth_sample_only() {
    let mut gate = DebounceGate::new(RpmBand::Off, 4);
    for _ in 0..3 {
        assert_eq!(gate.observe(RpmBand::Normal), RpmBand::Off);
    }
    assert_eq!(gate.observe(RpmBand::Normal), RpmBand::Normal);

    // An interrupted run starts over from the differing sample.
    for _ in 0..3 {
        gate.observe(RpmBand::Fast);
    }
    assert_eq!(gate.run_length(), 3);
    gate.observe(RpmBand::Normal);
    assert_eq!(gate.run_length(), 1);
    for _ in 0..3 {
        gate.observe(RpmBand::Fast);
    }
    assert_eq!(gate.committed(), RpmBand::Normal);
}

// ============================================================================
// Engine
// ============================================================================

fn engine() -> EngineMonitor {
    let mut config = EngineConfig::standard("gs1");
    config.run_grace_secs = 10;
    config.stop_grace_secs = 30;
    let mut e = EngineMonitor::new(&config, 3, t(0)).unwrap();
    e.initialize(&ReplayedHistory::default(), t(0));
    e
}

#[test]
fn test_engine_no_pressure_while_running_then_ok_stopped() {
    let mut e = engine();
    let mut out = Emitted::default();

    // Running at 2000 rpm with the switch reporting no pressure.
    for s in 0..=12 {
        step(&mut e, Sample::measurement("gs1_rpm", t(s), 2000.0, 2000.0), &mut out);
        step(&mut e, Sample::switch("gs1_oil", t(s), false), &mut out);
    }
    assert!(e.is_running());
    assert_eq!(out.alerts_in_state("NO_PRESSURE"), 1);
    assert_eq!(out.alerts_with_alarm(AlarmState::Critical), 1);

    // Stop; no pressure is normal for a stopped engine.
    step(&mut e, Sample::measurement("gs1_rpm", t(13), 0.0, 0.0), &mut out);
    for s in 14..=60 {
        step(&mut e, Sample::switch("gs1_oil", t(s), false), &mut out);
    }
    out.push(e.evaluate(t(61), true));
    out.push(e.evaluate(t(62), true));

    assert!(!e.is_running());
    assert_eq!(out.alerts_in_state("NO_PRESSURE"), 1);
    assert_eq!(out.alerts_in_state("OK_STOPPED"), 1);
}

#[test]
fn test_engine_start_and_stop_are_logged() {
    let mut e = engine();
    let mut out = Emitted::default();
    step(&mut e, Sample::measurement("gs1_rpm", t(0), 1500.0, 1500.0), &mut out);
    step(&mut e, Sample::measurement("gs1_rpm", t(3725), 0.0, 0.0), &mut out);

    let logs: Vec<_> = out
        .evaluations
        .iter()
        .filter_map(|e| e.log.as_ref())
        .filter(|l| matches!(l.event_type, LogEventType::On | LogEventType::Off))
        .collect();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].description, "Engine gs1 started with rpm 1500");
    assert_eq!(logs[1].description, "Engine gs1 stopped with rpm 0, ran for 01:02:05");
}

#[test]
fn test_engine_repeated_evaluation_is_idempotent() {
    let mut e = engine();
    for s in 0..5 {
        e.ingest(&Sample::measurement("gs1_rpm", t(s), 2600.0, 2600.0));
    }
    assert!(!e.evaluate(t(5), true).is_empty());
    assert!(e.evaluate(t(5), true).is_empty());
    assert!(e.evaluate(t(6), true).is_empty());
}

// ============================================================================
// Pump
// ============================================================================

#[test]
fn test_pump_on_too_long_raises_once_and_lowers_once() {
    let mut config = PumpConfig::standard("pmp_clp");
    config.on_too_long_secs = 300;
    let mut p = PumpMonitor::new(&config, t(0));
    p.initialize(&ReplayedHistory::default(), t(0));
    let mut out = Emitted::default();

    step(&mut p, Sample::switch("pmp_clp_switch", t(0), true), &mut out);
    for s in (30..=600).step_by(30) {
        step(&mut p, Sample::switch("pmp_clp_switch", t(s), true), &mut out);
    }
    assert_eq!(out.alerts_in_state("ON_TOO_LONG"), 1);
    assert_eq!(out.alerts_with_alarm(AlarmState::Severe), 1);

    let raised_at = out.evaluations.len();
    step(&mut p, Sample::switch("pmp_clp_switch", t(601), false), &mut out);
    step(&mut p, Sample::switch("pmp_clp_switch", t(602), false), &mut out);
    out.push(p.evaluate(t(700), true));

    let lowered = out.evaluations[raised_at..]
        .iter()
        .filter_map(|e| e.alert.as_ref())
        .filter(|a| a.is_lowered())
        .count();
    assert_eq!(lowered, 1);
}

#[test]
fn test_disable_mid_alarm_suppresses_without_replay() {
    let mut p = PumpMonitor::new(&PumpConfig::standard("pmp_sol"), t(0));
    p.initialize(&ReplayedHistory::default(), t(0));
    let mut out = Emitted::default();

    step(&mut p, Sample::switch("pmp_sol_switch", t(0), true), &mut out);
    out.push(p.evaluate(t(400), true));
    assert_eq!(out.alerts_in_state("ON_TOO_LONG"), 1);

    let record = p.set_enabled(false, t(401)).unwrap();
    assert_eq!(record.event_type, LogEventType::Disable);
    assert!(p.set_enabled(false, t(402)).is_none());

    let before = out.evaluations.len();
    step(&mut p, Sample::switch("pmp_sol_switch", t(410), false), &mut out);
    step(&mut p, Sample::switch("pmp_sol_switch", t(420), true), &mut out);
    out.push(p.evaluate(t(900), true));
    assert_eq!(out.evaluations.len(), before);

    // Re-enabling does not emit what happened while disabled.
    assert!(p.set_enabled(true, t(901)).is_some());
    assert_eq!(out.push(p.evaluate(t(901), true)), 0);
}

// ============================================================================
// Tank
// ============================================================================

#[test]
fn test_tank_is_silent_while_settling() {
    let mut config = TankConfig::standard("wt1", Some("water"));
    config.settle_secs = 45;
    let mut tank = TankMonitor::new(&config, 3, t(0)).unwrap();
    tank.initialize(&ReplayedHistory::default(), t(0));
    let mut out = Emitted::default();

    for s in 0..40 {
        step(&mut tank, Sample::measurement("wt1_level", t(s), 0.0, 0.0), &mut out);
    }
    assert!(out.evaluations.is_empty());

    out.push(tank.evaluate(t(45), true));
    assert_eq!(out.alerts_in_state("EMPTY"), 1);
    assert_eq!(out.alerts_with_alarm(AlarmState::Critical), 1);
}
