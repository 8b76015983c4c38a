use crate::trigger::{PulseTiming, TriggerMode, DEFAULT_TRIGGER_PERIOD, MIN_TRIGGER_PERIOD};
use crate::units::OperatingMode;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Trigger period {0:?} is below the minimum of 42ms")]
    PeriodTooShort(Duration),

    #[error("Pulse width must be non-zero")]
    ZeroPulseWidth,

    #[error("Idle interval must be non-zero")]
    ZeroIdleInterval,
}

/// Start-up settings for an [`Instrument`](crate::Instrument).
///
/// ```rust
/// use kei615_rs::{InstrumentConfig, OperatingMode, TriggerMode};
/// use std::time::Duration;
///
/// let config = InstrumentConfig::default()
///     .with_operating_mode(OperatingMode::Amperes)
///     .with_trigger_mode(TriggerMode::Periodic)
///     .with_trigger_period(Duration::from_millis(250));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    pub operating_mode: OperatingMode,
    pub trigger_mode: TriggerMode,
    pub trigger_period: Duration,
    pub pulse: PulseTiming,
    /// Scheduler sleep when not in periodic mode.
    pub idle_interval: Duration,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            operating_mode: OperatingMode::Unspecified,
            trigger_mode: TriggerMode::FreeRunning,
            trigger_period: DEFAULT_TRIGGER_PERIOD,
            pulse: PulseTiming::default(),
            idle_interval: Duration::from_secs(1),
        }
    }
}

impl InstrumentConfig {
    pub fn with_operating_mode(mut self, mode: OperatingMode) -> Self {
        self.operating_mode = mode;
        self
    }

    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    /// Ignored while free-running.
    pub fn with_trigger_period(mut self, period: Duration) -> Self {
        self.trigger_period = period;
        self
    }

    pub fn with_pulse_width(mut self, width: Duration) -> Self {
        self.pulse.width = width;
        self
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.pulse.sample_timeout = timeout;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger_period < MIN_TRIGGER_PERIOD {
            return Err(ConfigError::PeriodTooShort(self.trigger_period));
        }
        if self.pulse.width.is_zero() {
            return Err(ConfigError::ZeroPulseWidth);
        }
        if self.idle_interval.is_zero() {
            return Err(ConfigError::ZeroIdleInterval);
        }
        Ok(())
    }
}
