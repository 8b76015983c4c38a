use kei615_rs::{
    commands, Acquisition, Instrument, InstrumentConfig, Line, OperatingMode, Reading,
    SimulatedLines, TriggerMode,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn setup(config: InstrumentConfig) -> (Arc<SimulatedLines>, Instrument) {
    let lines = Arc::new(SimulatedLines::new());
    let instrument = Instrument::init(
        Arc::clone(&lines),
        config.with_idle_interval(Duration::from_millis(10)),
    )
    .unwrap();
    (lines, instrument)
}

#[test]
fn free_running_session_through_shell() {
    let (lines, instrument) = setup(InstrumentConfig::default());

    commands::execute(&instrument, "kei mode A").unwrap();
    lines.present(1999, 12, 0, true, false);
    lines.strobe();

    let printed = commands::execute(&instrument, "kei read").unwrap();
    assert_eq!(printed, "-000.1999 x 10^-12 A");
    assert_eq!(printed.parse::<Reading>().unwrap(), instrument.get_data().unwrap());

    // No trigger pulses while free-running
    assert!(lines.writes().iter().all(|&(line, level)| line != Line::Trigger || !level));
    instrument.shutdown();
}

#[test]
fn manual_reads_follow_the_input() {
    let (lines, instrument) = setup(
        InstrumentConfig::default()
            .with_operating_mode(OperatingMode::Ohms)
            .with_trigger_mode(TriggerMode::Manual),
    );
    lines.set_respond_to_trigger(true);

    for digits in [5, 50, 500, 1500] {
        lines.present(digits, 6, 1, false, false);
        let reading = instrument.get_data().unwrap();
        assert_eq!(
            reading,
            Reading::Measured {
                micro_units: i64::from(digits) * 1000,
                exponent: 6,
                mode: OperatingMode::Ohms,
            }
        );
    }

    lines.present(0, 0, 0, false, true);
    assert_eq!(instrument.print().unwrap(), "OVERLOAD");
    instrument.shutdown();
}

#[test]
fn periodic_acquisition_to_csv() {
    let (lines, instrument) = setup(
        InstrumentConfig::default()
            .with_operating_mode(OperatingMode::Coulombs)
            .with_trigger_mode(TriggerMode::Periodic)
            .with_trigger_period(Duration::from_millis(50)),
    );
    lines.set_respond_to_trigger(true);
    lines.present(321, 3, 0, false, false);
    thread::sleep(Duration::from_millis(150));

    let acquisition = Acquisition::collect(&instrument, 4, Duration::from_millis(20)).unwrap();
    instrument.shutdown();

    let mut csv = Vec::new();
    acquisition.write_csv(&mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 5);
    assert!(csv.lines().skip(1).all(|row| row.contains(",32100,-3,C,false")));
}

#[test]
fn switching_trigger_modes_reprograms_hold_lines() {
    let (lines, instrument) = setup(InstrumentConfig::default());
    assert!(!lines.level(Line::Hold(1)));

    commands::execute(&instrument, "kei trig mode P").unwrap();
    assert!(lines.level(Line::Hold(1)));
    commands::execute(&instrument, "kei trig period 100").unwrap();
    assert_eq!(
        commands::execute(&instrument, "kei trig period").unwrap(),
        "Current trigger period: 100 ms"
    );

    commands::execute(&instrument, "kei trig mode F").unwrap();
    assert!(!lines.level(Line::Hold(0)));
    assert!(!lines.level(Line::Hold(1)));
    assert!(commands::execute(&instrument, "kei trig period 100").is_err());
    instrument.shutdown();
}
