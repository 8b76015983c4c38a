use crate::instrument::{Instrument, InstrumentError};
use crate::units::Reading;
use polars::prelude::*;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

pub const TIME_COLUMN_NAME: &str = "time_s";
pub const VALUE_COLUMN_NAME: &str = "micro_units";
pub const EXPONENT_COLUMN_NAME: &str = "exponent";
pub const UNIT_COLUMN_NAME: &str = "unit";
pub const OVERLOAD_COLUMN_NAME: &str = "overload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedReading {
    /// Time since the acquisition started.
    pub elapsed: Duration,
    pub reading: Reading,
}

/// A series of timestamped readings.
#[derive(Debug, Clone)]
pub struct Acquisition {
    start: Instant,
    readings: Vec<TimedReading>,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            readings: Vec::new(),
        }
    }

    /// Take `count` readings, `interval` apart.
    pub fn collect(
        instrument: &Instrument,
        count: usize,
        interval: Duration,
    ) -> Result<Self, InstrumentError> {
        let mut acquisition = Self::new();
        for i in 0..count {
            if i > 0 {
                thread::sleep(interval);
            }
            acquisition.record(instrument)?;
        }
        log::debug!("Collected {} readings", acquisition.len());
        Ok(acquisition)
    }

    /// Get a reading from the instrument and append it.
    pub fn record(&mut self, instrument: &Instrument) -> Result<Reading, InstrumentError> {
        let reading = instrument.get_data()?;
        self.push(self.start.elapsed(), reading);
        Ok(reading)
    }

    pub fn push(&mut self, elapsed: Duration, reading: Reading) {
        self.readings.push(TimedReading { elapsed, reading });
    }

    pub fn readings(&self) -> &[TimedReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// One row per reading. Numeric columns are null for overloads.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut times = Vec::with_capacity(self.readings.len());
        let mut values = Vec::with_capacity(self.readings.len());
        let mut exponents = Vec::with_capacity(self.readings.len());
        let mut units = Vec::with_capacity(self.readings.len());
        let mut overloads = Vec::with_capacity(self.readings.len());

        for timed in &self.readings {
            times.push(timed.elapsed.as_secs_f64());
            match timed.reading {
                Reading::Overload => {
                    values.push(None);
                    exponents.push(None);
                    units.push(None);
                    overloads.push(true);
                }
                Reading::Measured {
                    micro_units,
                    exponent,
                    mode,
                } => {
                    values.push(Some(micro_units));
                    exponents.push(Some(i32::from(exponent)));
                    units.push(Some(mode.unit()));
                    overloads.push(false);
                }
            }
        }

        df!(
            TIME_COLUMN_NAME => times,
            VALUE_COLUMN_NAME => values,
            EXPONENT_COLUMN_NAME => exponents,
            UNIT_COLUMN_NAME => units,
            OVERLOAD_COLUMN_NAME => overloads
        )
    }

    /// Rows that carry a value, overloads dropped.
    pub fn measured(&self) -> PolarsResult<LazyFrame> {
        Ok(self
            .to_dataframe()?
            .lazy()
            .filter(col(OVERLOAD_COLUMN_NAME).not()))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> PolarsResult<()> {
        let mut df = self.to_dataframe()?;
        CsvWriter::new(writer).include_header(true).finish(&mut df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::lines::SimulatedLines;
    use crate::units::OperatingMode;
    use std::sync::Arc;

    fn sample_acquisition() -> Acquisition {
        let mut acquisition = Acquisition::new();
        acquisition.push(
            Duration::from_millis(0),
            Reading::Measured {
                micro_units: 12_300,
                exponent: -6,
                mode: OperatingMode::Amperes,
            },
        );
        acquisition.push(Duration::from_millis(100), Reading::Overload);
        acquisition.push(
            Duration::from_millis(200),
            Reading::Measured {
                micro_units: -500,
                exponent: -6,
                mode: OperatingMode::Amperes,
            },
        );
        acquisition
    }

    #[test]
    fn test_dataframe_shape() {
        let df = sample_acquisition().to_dataframe().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 5);

        let values = df.column(VALUE_COLUMN_NAME).unwrap().i64().unwrap();
        assert_eq!(values.get(0), Some(12_300));
        assert_eq!(values.get(1), None);
        assert_eq!(values.get(2), Some(-500));

        let overload = df.column(OVERLOAD_COLUMN_NAME).unwrap().bool().unwrap();
        assert_eq!(overload.get(1), Some(true));
    }

    #[test]
    fn test_measured_drops_overloads() {
        let df = sample_acquisition().measured().unwrap().collect().unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_write_csv() {
        let mut out = Vec::new();
        sample_acquisition().write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("time_s,micro_units,exponent,unit,overload"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_collect_from_instrument() {
        let sim = Arc::new(SimulatedLines::new());
        let config = InstrumentConfig::default()
            .with_operating_mode(OperatingMode::Volts)
            .with_idle_interval(Duration::from_millis(10));
        let inst = Instrument::init(Arc::clone(&sim), config).unwrap();
        sim.present(250, 1, 0, false, false);
        sim.strobe();

        let acquisition = Acquisition::collect(&inst, 3, Duration::from_millis(1)).unwrap();
        assert_eq!(acquisition.len(), 3);
        assert!(acquisition.readings().windows(2).all(|w| w[0].elapsed <= w[1].elapsed));
        assert!(acquisition
            .readings()
            .iter()
            .all(|r| r.reading.to_string() == "+000.0250 x 10^+01 V"));
        inst.shutdown();
    }
}
