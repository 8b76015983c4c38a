//! Conversion of raw connector samples into physical readings.
//!
//! All arithmetic is integer: a reading's value is kept in micro-units and
//! its decade exponent separately, so nothing is lost between the digits the
//! instrument shows and the digits we print.

use crate::capture::{RawSample, SampleFlags};
use std::fmt;
use std::str::FromStr;

/// Micro-units represented by the least significant digit at sensitivity 0.
pub const LSD_MICRO_UNITS: i64 = 100;

const MICRO_PER_UNIT: u64 = 1_000_000;

/// What the electrometer's front panel is set to measure. The connector does
/// not carry this, so it has to be told.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    #[default]
    Unspecified,
    Volts,
    Ohms,
    Coulombs,
    Amperes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("Invalid mode number {0}")]
    InvalidNumber(u8),

    #[error("Unsupported value for mode: {0:?}")]
    UnsupportedValue(String),
}

impl OperatingMode {
    pub const ALL: [Self; 5] = [
        Self::Unspecified,
        Self::Volts,
        Self::Ohms,
        Self::Coulombs,
        Self::Amperes,
    ];

    /// Unit suffix used when printing a reading.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Unspecified => "U",
            Self::Volts => "V",
            Self::Ohms => "ohms",
            Self::Coulombs => "C",
            Self::Amperes => "A",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unspecified => "None",
            Self::Volts => "Volts",
            Self::Ohms => "Ohms",
            Self::Coulombs => "Coulombs",
            Self::Amperes => "Amperes",
        }
    }

    /// Whether the instrument's range is a positive decade multiplier in this mode.
    ///
    /// Voltage and resistance ranges go up in decades, charge and current
    /// ranges go down. Nothing about this is uniform, so callers should not
    /// assume a sign.
    pub fn positive_exponent(&self) -> bool {
        match self {
            Self::Volts | Self::Ohms => true,
            Self::Unspecified | Self::Coulombs | Self::Amperes => false,
        }
    }

    pub fn from_unit(unit: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.unit() == unit)
    }

    /// Single-letter shell code; `Unspecified` has none.
    pub fn letter(&self) -> Option<char> {
        match self {
            Self::Unspecified => None,
            Self::Volts => Some('V'),
            Self::Ohms => Some('O'),
            Self::Coulombs => Some('C'),
            Self::Amperes => Some('A'),
        }
    }
}

impl From<OperatingMode> for u8 {
    fn from(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Unspecified => 0,
            OperatingMode::Volts => 1,
            OperatingMode::Ohms => 2,
            OperatingMode::Coulombs => 3,
            OperatingMode::Amperes => 4,
        }
    }
}

impl TryFrom<u8> for OperatingMode {
    type Error = ModeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|mode| u8::from(*mode) == value)
            .ok_or(ModeError::InvalidNumber(value))
    }
}

impl FromStr for OperatingMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V" => Ok(Self::Volts),
            "O" => Ok(Self::Ohms),
            "C" => Ok(Self::Coulombs),
            "A" => Ok(Self::Amperes),
            _ => Err(ModeError::UnsupportedValue(s.to_string())),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A normalized reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// The input exceeds the selected range; there is no number to report.
    Overload,
    Measured {
        /// Mantissa in micro-units, not accounting for the exponent.
        micro_units: i64,
        /// Signed decade exponent.
        exponent: i8,
        mode: OperatingMode,
    },
}

impl Reading {
    pub fn flags(&self) -> SampleFlags {
        match self {
            Self::Overload => SampleFlags::OVERLOAD,
            Self::Measured { .. } => SampleFlags::empty(),
        }
    }

    pub fn is_overload(&self) -> bool {
        matches!(self, Self::Overload)
    }
}

/// Convert a raw sample under the given operating mode.
pub fn convert(raw: &RawSample, mode: OperatingMode) -> Reading {
    if raw.is_overload() {
        return Reading::Overload;
    }

    let scale = 10_i64.saturating_pow(u32::from(raw.sensitivity));
    let magnitude = i64::from(raw.value.unsigned_abs())
        .saturating_mul(LSD_MICRO_UNITS)
        .saturating_mul(scale);
    let micro_units = if raw.value < 0 { -magnitude } else { magnitude };

    let range = i8::try_from(raw.range).unwrap_or(i8::MAX);
    let exponent = if mode.positive_exponent() { range } else { -range };

    Reading::Measured {
        micro_units,
        exponent,
        mode,
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overload => write!(f, "OVERLOAD"),
            Self::Measured {
                micro_units,
                exponent,
                mode,
            } => {
                let abs = micro_units.unsigned_abs();
                let sign = if *micro_units < 0 { '-' } else { '+' };
                write!(
                    f,
                    "{}{:03}.{:04} x 10^{:+03} {}",
                    sign,
                    abs / MICRO_PER_UNIT,
                    (abs % MICRO_PER_UNIT) / 100,
                    exponent,
                    mode.unit()
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseReadingError {
    #[error("Malformed reading: {0:?}")]
    Malformed(String),

    #[error("Unknown unit: {0:?}")]
    UnknownUnit(String),
}

impl FromStr for Reading {
    type Err = ParseReadingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "OVERLOAD" {
            return Ok(Self::Overload);
        }
        let malformed = || ParseReadingError::Malformed(s.to_string());

        let mut fields = s.split_whitespace();
        let (Some(mantissa), Some("x"), Some(power), Some(unit), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(malformed());
        };

        let negative = match mantissa.chars().next() {
            Some('-') => true,
            Some('+') => false,
            _ => return Err(malformed()),
        };
        let (whole, fraction) = mantissa[1..].split_once('.').ok_or_else(malformed)?;
        if fraction.len() != 4 || !is_digits(whole) || !is_digits(fraction) {
            return Err(malformed());
        }
        let whole: i64 = whole.parse().map_err(|_| malformed())?;
        let fraction: i64 = fraction.parse().map_err(|_| malformed())?;
        let magnitude = whole * 1_000_000 + fraction * 100;

        let exponent: i8 = power
            .strip_prefix("10^")
            .ok_or_else(malformed)?
            .parse()
            .map_err(|_| malformed())?;

        let mode = OperatingMode::from_unit(unit)
            .ok_or_else(|| ParseReadingError::UnknownUnit(unit.to_string()))?;

        Ok(Self::Measured {
            micro_units: if negative { -magnitude } else { magnitude },
            exponent,
            mode,
        })
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
