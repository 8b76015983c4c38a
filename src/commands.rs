//! The `kei` shell command set served by the interface board.
//!
//! ```text
//! kei read                 Get and display a reading from the instrument
//! kei mode [V|O|C|A]       Get/set electrometer mode
//! kei trig mode [F|P|M]    Get/set trigger mode
//! kei trig period [ms]     Get/set trigger period (periodic mode only)
//! ```

use crate::instrument::{Instrument, InstrumentError};
use crate::trigger::{TriggerMode, MIN_TRIGGER_PERIOD};
use crate::units::OperatingMode;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read,
    GetMode,
    SetMode(OperatingMode),
    GetTriggerMode,
    SetTriggerMode(TriggerMode),
    GetTriggerPeriod,
    /// Period in milliseconds.
    SetTriggerPeriod(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0:?}")]
    Unknown(String),

    #[error("This command does not expect any arguments")]
    UnexpectedArguments,

    #[error("Too many arguments!")]
    TooManyArguments,

    #[error("Unsupported value for mode")]
    UnsupportedMode,

    #[error("Period must be a number")]
    PeriodNotNumber,

    #[error("Period cannot be lower than {0}")]
    PeriodTooShort(u128),

    #[error("Only valid in periodic mode")]
    OnlyInPeriodic,

    #[error("{0}")]
    Instrument(#[from] InstrumentError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words: Vec<&str> = s.split_whitespace().collect();
        if words.first() == Some(&"kei") {
            words.remove(0);
        }

        match words.as_slice() {
            ["read"] => Ok(Self::Read),
            ["read", ..] => Err(CommandError::UnexpectedArguments),
            ["mode"] => Ok(Self::GetMode),
            ["mode", mode] => mode
                .parse()
                .map(Self::SetMode)
                .map_err(|_| CommandError::UnsupportedMode),
            ["mode", ..] => Err(CommandError::TooManyArguments),
            ["trig", "mode"] => Ok(Self::GetTriggerMode),
            ["trig", "mode", mode] => mode
                .parse()
                .map(Self::SetTriggerMode)
                .map_err(|_| CommandError::UnsupportedMode),
            ["trig", "mode", ..] => Err(CommandError::TooManyArguments),
            ["trig", "period"] => Ok(Self::GetTriggerPeriod),
            ["trig", "period", period] => parse_period(period).map(Self::SetTriggerPeriod),
            ["trig", "period", ..] => Err(CommandError::TooManyArguments),
            _ => Err(CommandError::Unknown(s.trim().to_string())),
        }
    }
}

fn parse_period(period: &str) -> Result<u32, CommandError> {
    if !period.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::PeriodNotNumber);
    }
    period.parse().map_err(|_| CommandError::PeriodNotNumber)
}

impl Command {
    /// Run the command, returning the text the shell prints. Setters print nothing.
    pub fn execute(self, instrument: &Instrument) -> Result<String, CommandError> {
        match self {
            Self::Read => Ok(instrument.get_data()?.to_string()),
            Self::GetMode => {
                let mode = instrument.mode();
                Ok(format!("Current mode: {} ({})", mode, u8::from(mode)))
            }
            Self::SetMode(mode) => {
                instrument.set_mode(mode);
                Ok(String::new())
            }
            Self::GetTriggerMode => {
                let mode = instrument.trigger_state().mode;
                Ok(format!("Current trigger mode: {} ({})", mode, u8::from(mode)))
            }
            Self::SetTriggerMode(mode) => {
                instrument.set_trigger_mode(mode)?;
                Ok(String::new())
            }
            Self::GetTriggerPeriod => {
                let state = instrument.trigger_state();
                if state.mode != TriggerMode::Periodic {
                    return Err(CommandError::OnlyInPeriodic);
                }
                Ok(format!(
                    "Current trigger period: {} ms",
                    state.period.as_millis()
                ))
            }
            Self::SetTriggerPeriod(period_ms) => {
                if instrument.trigger_state().mode != TriggerMode::Periodic {
                    return Err(CommandError::OnlyInPeriodic);
                }
                let period = Duration::from_millis(u64::from(period_ms));
                if period < MIN_TRIGGER_PERIOD {
                    return Err(CommandError::PeriodTooShort(MIN_TRIGGER_PERIOD.as_millis()));
                }
                instrument.set_trigger_period(period)?;
                Ok(String::new())
            }
        }
    }
}

/// Parse and run one shell line.
pub fn execute(instrument: &Instrument, line: &str) -> Result<String, CommandError> {
    let command: Command = line.parse()?;
    log::debug!("Executing {:?}", command);
    command.execute(instrument)
}
