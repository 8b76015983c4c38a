use crate::capture::{RawSample, SampleReceiver};
use crate::clock::{Clock, StopSignal};
use crate::lines::{DigitalLines, Line, LineError};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The manual states a maximum rate of 24 readings per second, slightly
/// lower on 50 Hz units.
pub const MIN_TRIGGER_PERIOD: Duration = Duration::from_millis(42);
pub const DEFAULT_TRIGGER_PERIOD: Duration = Duration::from_secs(1);

/// Who starts a measurement cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    /// The instrument triggers itself.
    #[default]
    FreeRunning,
    /// The scheduler triggers the instrument at a fixed period.
    Periodic,
    /// The instrument is only triggered when a reading is requested.
    Manual,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeRunning => "free-running",
            Self::Periodic => "periodic",
            Self::Manual => "manual",
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Self::FreeRunning => 'F',
            Self::Periodic => 'P',
            Self::Manual => 'M',
        }
    }

    /// Levels of the two hold lines while in this mode.
    fn hold_levels(self) -> [bool; 2] {
        match self {
            Self::FreeRunning => [false, false],
            // Hold 1 alone is enough to stop the instrument self-triggering
            Self::Periodic | Self::Manual => [false, true],
        }
    }
}

impl From<TriggerMode> for u8 {
    fn from(mode: TriggerMode) -> Self {
        match mode {
            TriggerMode::FreeRunning => 1,
            TriggerMode::Periodic => 2,
            TriggerMode::Manual => 3,
        }
    }
}

impl TryFrom<u8> for TriggerMode {
    type Error = TriggerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::FreeRunning),
            2 => Ok(Self::Periodic),
            3 => Ok(Self::Manual),
            _ => Err(TriggerError::InvalidMode(value.to_string())),
        }
    }
}

impl FromStr for TriggerMode {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F" => Ok(Self::FreeRunning),
            "P" => Ok(Self::Periodic),
            "M" => Ok(Self::Manual),
            _ => Err(TriggerError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Line error: {0}")]
    Line(#[from] LineError),

    #[error("Invalid trigger mode {0:?}")]
    InvalidMode(String),

    #[error("Trigger period {requested:?} is below the minimum of 42ms")]
    PeriodTooShort { requested: Duration },

    #[error("Trigger period has no meaning while free-running")]
    PeriodWhileFreeRunning,

    #[error("Cannot trigger a free-running instrument")]
    FreeRunning,

    #[error("No sample arrived within {0:?} of the trigger")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
    pub mode: TriggerMode,
    /// Only used in [`TriggerMode::Periodic`].
    pub period: Duration,
}

impl Default for TriggerState {
    fn default() -> Self {
        Self {
            mode: TriggerMode::FreeRunning,
            period: DEFAULT_TRIGGER_PERIOD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    /// How long the trigger line is held asserted.
    pub width: Duration,
    /// How long a blocking pulse waits for the resulting sample.
    pub sample_timeout: Duration,
}

impl Default for PulseTiming {
    fn default() -> Self {
        Self {
            width: Duration::from_millis(5),
            sample_timeout: Duration::from_millis(100),
        }
    }
}

/// Owns the trigger and hold lines.
pub struct TriggerController {
    lines: Arc<dyn DigitalLines>,
    clock: Arc<dyn Clock>,
    samples: SampleReceiver,
    timing: PulseTiming,
    state: Mutex<TriggerState>,
}

impl TriggerController {
    /// Create a controller in free-running mode. The lines are assumed to
    /// already be configured with trigger and hold inactive.
    pub fn new(
        lines: Arc<dyn DigitalLines>,
        clock: Arc<dyn Clock>,
        samples: SampleReceiver,
        timing: PulseTiming,
    ) -> Self {
        Self {
            lines,
            clock,
            samples,
            timing,
            state: Mutex::new(TriggerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> TriggerState {
        *self.lock()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Switch trigger mode, reprogramming the hold lines. A failing line
    /// leaves the mode unchanged but the lines in whatever state they reached.
    pub fn set_mode(&self, mode: TriggerMode) -> Result<(), TriggerError> {
        let mut state = self.lock();
        let [hold0, hold1] = mode.hold_levels();

        self.lines.write(Line::Trigger, false)?;
        self.lines.write(Line::Hold(0), hold0)?;
        self.lines.write(Line::Hold(1), hold1)?;

        if state.mode != mode {
            log::info!("Trigger mode {} -> {}", state.mode, mode);
        }
        state.mode = mode;
        Ok(())
    }

    /// Set the period used in periodic mode. Takes effect at the next cycle.
    pub fn set_period(&self, period: Duration) -> Result<(), TriggerError> {
        if period < MIN_TRIGGER_PERIOD {
            return Err(TriggerError::PeriodTooShort { requested: period });
        }

        let mut state = self.lock();
        if state.mode == TriggerMode::FreeRunning {
            return Err(TriggerError::PeriodWhileFreeRunning);
        }
        log::debug!("Trigger period set to {:?}", period);
        state.period = period;
        Ok(())
    }

    /// Pulse the trigger line without waiting for the resulting sample.
    #[tracing::instrument(skip(self), level = "trace")]
    pub fn pulse(&self) -> Result<(), TriggerError> {
        if self.state().mode == TriggerMode::FreeRunning {
            return Err(TriggerError::FreeRunning);
        }

        self.lines.write(Line::Trigger, true)?;
        self.clock.sleep(self.timing.width);
        self.lines.write(Line::Trigger, false)?;
        Ok(())
    }

    /// Pulse the trigger line and block until a sample captured after the
    /// pulse started arrives.
    pub fn pulse_and_wait(&self) -> Result<RawSample, TriggerError> {
        let sequence = self.samples.sequence();
        self.pulse()?;

        self.samples
            .wait_newer(sequence, self.timing.sample_timeout)
            .map(|(sample, _)| sample)
            .ok_or(TriggerError::Timeout(self.timing.sample_timeout))
    }

    /// One scheduler iteration. Returns how long to sleep before the next one.
    pub fn schedule_step(&self, schedule: &mut PeriodicSchedule, idle: Duration) -> Duration {
        let state = self.state();
        if state.mode != TriggerMode::Periodic {
            return idle;
        }

        let now = self.clock.now();
        if schedule.poll(now, state.period) {
            if let Err(e) = self.pulse() {
                log::warn!("Periodic trigger failed: {}", e);
            }
        }
        schedule.until_next(now)
    }
}

/// Deadline bookkeeping for periodic triggering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodicSchedule {
    next: Duration,
}

impl PeriodicSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_deadline(&self) -> Duration {
        self.next
    }

    /// Returns whether a trigger is due at `now`, advancing the deadline if so.
    /// When more than one period was missed the deadline is resynchronized to
    /// `now + period` instead of firing a burst of catch-up triggers.
    pub fn poll(&mut self, now: Duration, period: Duration) -> bool {
        if now < self.next {
            return false;
        }

        self.next += period;
        if now >= self.next {
            self.next = now + period;
        }
        true
    }

    pub fn until_next(&self, now: Duration) -> Duration {
        self.next.saturating_sub(now)
    }
}

/// Background thread running the periodic trigger loop.
pub struct Scheduler {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(controller: Arc<TriggerController>, idle: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(StopSignal::new());
        let stop_signal = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("kei-trigger".to_string())
            .spawn(move || {
                let _span = tracing::debug_span!("trigger_scheduler").entered();
                log::info!("Trigger scheduler started");

                let mut schedule = PeriodicSchedule::new();
                while !stop_signal.is_stopped() {
                    let sleep = controller.schedule_step(&mut schedule, idle);
                    if controller.clock().sleep_unless_stopped(sleep, &stop_signal) {
                        break;
                    }
                }
                log::debug!("Trigger scheduler stopped");
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop the loop, waking it from its current sleep, and wait for the thread.
    pub fn shutdown(mut self) {
        self.stop.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Trigger scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop.stop();
    }
}
