use crate::capture::{sample_channel, strobe_handler, RawSample, SampleReceiver};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ConfigError, InstrumentConfig};
use crate::lines::{DigitalLines, Line, LineError};
use crate::trigger::{Scheduler, TriggerController, TriggerError, TriggerMode, TriggerState};
use crate::units::{convert, OperatingMode, Reading};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("Line error: {0}")]
    Line(#[from] LineError),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start trigger scheduler: {0}")]
    Scheduler(#[from] std::io::Error),
}

/// A Keithley 615 attached through its BCD connector.
///
/// Owns the sample slot fed by the print strobe, the trigger controller and
/// its background scheduler, and the operating mode used to interpret samples.
pub struct Instrument {
    samples: SampleReceiver,
    trigger: Arc<TriggerController>,
    mode: Mutex<OperatingMode>,
    scheduler: Option<Scheduler>,
}

impl Instrument {
    /// Configure every line, hook the print strobe and start the trigger scheduler.
    pub fn init<L: DigitalLines + 'static>(
        lines: Arc<L>,
        config: InstrumentConfig,
    ) -> Result<Self, InstrumentError> {
        Self::init_with_clock(lines, Arc::new(MonotonicClock::new()), config)
    }

    pub fn init_with_clock<L: DigitalLines + 'static>(
        lines: Arc<L>,
        clock: Arc<dyn Clock>,
        config: InstrumentConfig,
    ) -> Result<Self, InstrumentError> {
        config.validate()?;

        for (line, direction) in Line::all() {
            lines.configure(line, direction)?;
        }
        log::info!("Interface lines configured");

        let (sender, samples) = sample_channel();
        let trigger = Arc::new(TriggerController::new(
            Arc::clone(&lines) as Arc<dyn DigitalLines>,
            clock,
            samples.clone(),
            config.pulse,
        ));
        if config.trigger_mode != TriggerMode::FreeRunning {
            trigger.set_mode(config.trigger_mode)?;
            trigger.set_period(config.trigger_period)?;
        }

        let scheduler = Scheduler::spawn(Arc::clone(&trigger), config.idle_interval)?;

        // Last fallible step, so a failed init leaves no handler behind
        lines.subscribe_print_strobe(Box::new(strobe_handler(&lines, sender)))?;
        log::info!("Print strobe handler registered");

        Ok(Self {
            samples,
            trigger,
            mode: Mutex::new(config.operating_mode),
            scheduler: Some(scheduler),
        })
    }

    pub fn set_mode(&self, mode: OperatingMode) {
        log::debug!("Operating mode set to {}", mode);
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_trigger_mode(&self, mode: TriggerMode) -> Result<(), InstrumentError> {
        Ok(self.trigger.set_mode(mode)?)
    }

    pub fn set_trigger_period(&self, period: Duration) -> Result<(), InstrumentError> {
        Ok(self.trigger.set_period(period)?)
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.trigger.state()
    }

    /// The most recent sample as captured, without unit handling.
    pub fn raw_sample(&self) -> RawSample {
        self.samples.latest().0
    }

    /// Get the most recent reading. In manual trigger mode the instrument is
    /// triggered first and the sample caused by that trigger is returned.
    pub fn get_data(&self) -> Result<Reading, InstrumentError> {
        let raw = if self.trigger.state().mode == TriggerMode::Manual {
            self.trigger.pulse_and_wait()?
        } else {
            self.raw_sample()
        };

        Ok(convert(&raw, self.mode()))
    }

    /// Log the current reading and return it as printed.
    pub fn print(&self) -> Result<String, InstrumentError> {
        let printed = self.get_data()?.to_string();
        log::info!("data: {}", printed);
        Ok(printed)
    }

    /// Stop the trigger scheduler and wait for it to exit.
    pub fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::{Direction, SimulatedLines};

    fn instrument(sim: &Arc<SimulatedLines>, config: InstrumentConfig) -> Instrument {
        let config = config.with_idle_interval(Duration::from_millis(10));
        Instrument::init(Arc::clone(sim), config).unwrap()
    }

    #[test]
    fn test_init_configures_lines() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(&sim, InstrumentConfig::default());

        assert_eq!(sim.direction(Line::Trigger), Some(Direction::OutputInactive));
        assert_eq!(sim.direction(Line::Hold(1)), Some(Direction::OutputInactive));
        assert_eq!(sim.direction(Line::Data(12)), Some(Direction::Input));
        assert_eq!(sim.direction(Line::Print), Some(Direction::Input));
        assert_eq!(sim.handler_count(), 1);
        assert_eq!(inst.trigger_state(), TriggerState::default());
        inst.shutdown();
    }

    #[test]
    fn test_init_fails_on_line_configuration() {
        let sim = Arc::new(SimulatedLines::new());
        sim.fail_line(Line::Range(3));
        let result = Instrument::init(Arc::clone(&sim), InstrumentConfig::default());
        assert!(matches!(
            result,
            Err(InstrumentError::Line(LineError::Configure(Line::Range(3))))
        ));
    }

    #[test]
    fn test_init_fails_on_subscription() {
        let sim = Arc::new(SimulatedLines::new());
        sim.reject_subscriptions();
        assert!(matches!(
            Instrument::init(Arc::clone(&sim), InstrumentConfig::default()),
            Err(InstrumentError::Line(LineError::Subscribe(Line::Print)))
        ));
    }

    #[test]
    fn test_failed_init_leaves_no_handler() {
        let sim = Arc::new(SimulatedLines::new());
        sim.fail_writes(Line::Hold(1));
        let config = InstrumentConfig::default().with_trigger_mode(TriggerMode::Manual);
        for _ in 0..3 {
            assert!(matches!(
                Instrument::init(Arc::clone(&sim), config.clone()),
                Err(InstrumentError::Trigger(TriggerError::Line(LineError::Write(
                    Line::Hold(1)
                ))))
            ));
        }
        assert_eq!(sim.handler_count(), 0);

        sim.heal_line(Line::Hold(1));
        let inst = instrument(&sim, config);
        assert_eq!(sim.handler_count(), 1);
        inst.shutdown();
    }

    #[test]
    fn test_shutdown_does_not_wait_out_the_period() {
        let sim = Arc::new(SimulatedLines::new());
        let config = InstrumentConfig::default()
            .with_trigger_mode(TriggerMode::Periodic)
            .with_trigger_period(Duration::from_secs(5));
        let inst = Instrument::init(Arc::clone(&sim), config).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let started = std::time::Instant::now();
        inst.shutdown();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let sim = Arc::new(SimulatedLines::new());
        let config = InstrumentConfig::default().with_trigger_period(Duration::from_millis(10));
        assert!(matches!(
            Instrument::init(Arc::clone(&sim), config),
            Err(InstrumentError::Config(_))
        ));
        assert!(sim.direction(Line::Trigger).is_none());
    }

    #[test]
    fn test_init_applies_trigger_config() {
        let sim = Arc::new(SimulatedLines::new());
        let config = InstrumentConfig::default()
            .with_trigger_mode(TriggerMode::Manual)
            .with_trigger_period(Duration::from_millis(500));
        let inst = instrument(&sim, config);

        assert_eq!(
            inst.trigger_state(),
            TriggerState {
                mode: TriggerMode::Manual,
                period: Duration::from_millis(500),
            }
        );
        assert!(sim.level(Line::Hold(1)));
        inst.shutdown();
    }

    #[test]
    fn test_get_data_before_any_capture() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(&sim, InstrumentConfig::default());
        assert_eq!(inst.print().unwrap(), "+000.0000 x 10^+00 U");
        inst.shutdown();
    }

    #[test]
    fn test_get_data_is_stable_without_capture() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(
            &sim,
            InstrumentConfig::default().with_operating_mode(OperatingMode::Volts),
        );
        sim.present(1234, 2, 0, true, false);
        sim.strobe();
        // Lines change, but no strobe
        sim.present(999, 5, 3, false, false);

        let first = inst.get_data().unwrap();
        assert_eq!(
            first,
            Reading::Measured {
                micro_units: -123_400,
                exponent: 2,
                mode: OperatingMode::Volts,
            }
        );
        assert_eq!(inst.get_data().unwrap(), first);
        inst.shutdown();
    }

    #[test]
    fn test_mode_changes_interpretation_only() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(&sim, InstrumentConfig::default());
        sim.present(1000, 9, 1, false, false);
        sim.strobe();

        inst.set_mode(OperatingMode::Coulombs);
        assert_eq!(inst.print().unwrap(), "+001.0000 x 10^-09 C");
        inst.set_mode(OperatingMode::Ohms);
        assert_eq!(inst.print().unwrap(), "+001.0000 x 10^+09 ohms");
        inst.shutdown();
    }

    #[test]
    fn test_overload_prints_token() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(&sim, InstrumentConfig::default());
        sim.present(1999, 3, 0, false, true);
        sim.strobe();
        assert_eq!(inst.get_data().unwrap(), Reading::Overload);
        assert_eq!(inst.print().unwrap(), "OVERLOAD");
        inst.shutdown();
    }

    #[test]
    fn test_manual_get_data_triggers() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(
            &sim,
            InstrumentConfig::default().with_operating_mode(OperatingMode::Amperes),
        );
        inst.set_trigger_mode(TriggerMode::Manual).unwrap();
        sim.set_respond_to_trigger(true);
        sim.clear_writes();

        sim.present(1500, 6, 0, false, false);
        assert_eq!(inst.print().unwrap(), "+000.1500 x 10^-06 A");
        assert_eq!(
            sim.writes(),
            vec![(Line::Trigger, true), (Line::Trigger, false)]
        );
        inst.shutdown();
    }

    #[test]
    fn test_manual_get_data_times_out() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(&sim, InstrumentConfig::default());
        inst.set_trigger_mode(TriggerMode::Manual).unwrap();
        assert!(matches!(
            inst.get_data(),
            Err(InstrumentError::Trigger(TriggerError::Timeout(_)))
        ));
        inst.shutdown();
    }

    #[test]
    fn test_periodic_mode_refreshes_samples() {
        let sim = Arc::new(SimulatedLines::new());
        sim.set_respond_to_trigger(true);
        let config = InstrumentConfig::default()
            .with_operating_mode(OperatingMode::Volts)
            .with_trigger_mode(TriggerMode::Periodic)
            .with_trigger_period(Duration::from_millis(50));
        let inst = instrument(&sim, config);

        sim.present(700, 1, 0, false, false);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(inst.print().unwrap(), "+000.0700 x 10^+01 V");

        sim.present(701, 1, 0, false, false);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(inst.print().unwrap(), "+000.0701 x 10^+01 V");
        inst.shutdown();
    }

    #[test]
    fn test_trigger_period_setter() {
        let sim = Arc::new(SimulatedLines::new());
        let inst = instrument(&sim, InstrumentConfig::default());
        assert!(inst.set_trigger_period(Duration::from_millis(100)).is_err());
        inst.set_trigger_mode(TriggerMode::Periodic).unwrap();
        assert!(inst.set_trigger_period(Duration::from_millis(41)).is_err());
        inst.set_trigger_period(Duration::from_millis(42)).unwrap();
        assert_eq!(inst.trigger_state().period, Duration::from_millis(42));
        inst.shutdown();
    }
}
