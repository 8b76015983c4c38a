//! # KEI615 RS
//!
//! A Rust library for reading a Keithley 615 digital electrometer through the
//! BCD output on its 50-pin rear connector.
//!
//! The instrument presents each reading as 3.5 BCD digits plus range,
//! sensitivity, polarity and overload lines, and pulses a print strobe once
//! the lines are stable. This crate captures those lines on every strobe,
//! drives the trigger and hold lines, and converts samples into readings in
//! micro-units without any floating point on the way.
//!
//! ## Features
//!
//! - **Sample capture**: coherent snapshots taken on the print strobe, handed
//!   over through a single-slot channel
//! - **Trigger control**: free-running, periodic (background scheduler) and
//!   manual (trigger on read) modes
//! - **Unit conversion**: exact fixed-point readings with the mode-dependent
//!   exponent sign of the instrument family
//! - **Shell commands**: the `kei` command set of the interface board
//! - **Remote access**: a serial client for boards exposing that shell over USB
//! - **Data logging**: timestamped readings as `polars` DataFrames
//!
//! ## Examples
//!
//! ### Reading from a simulated connector
//!
//! ```rust
//! use kei615_rs::{Instrument, InstrumentConfig, OperatingMode, SimulatedLines};
//! use std::sync::Arc;
//!
//! let lines = Arc::new(SimulatedLines::new());
//! let instrument = Instrument::init(
//!     Arc::clone(&lines),
//!     InstrumentConfig::default().with_operating_mode(OperatingMode::Amperes),
//! )?;
//!
//! // The instrument shows -1234 on its 10^-9 range and strobes
//! lines.present(1234, 9, 0, true, false);
//! lines.strobe();
//!
//! assert_eq!(instrument.print()?, "-000.1234 x 10^-09 A");
//! instrument.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Manual triggering
//!
//! ```rust
//! use kei615_rs::{Instrument, InstrumentConfig, SimulatedLines, TriggerMode};
//! use std::sync::Arc;
//!
//! let lines = Arc::new(SimulatedLines::new());
//! lines.set_respond_to_trigger(true);
//! let instrument = Instrument::init(Arc::clone(&lines), InstrumentConfig::default())?;
//! instrument.set_trigger_mode(TriggerMode::Manual)?;
//!
//! lines.present(42, 0, 0, false, false);
//! // get_data() pulses the trigger line and waits for the resulting sample
//! let reading = instrument.get_data()?;
//! println!("{reading}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Talking to an interface board
//!
//! ```rust,no_run
//! use kei615_rs::{KeiConnector, OperatingMode, TriggerMode};
//! use std::time::Duration;
//!
//! let mut board = KeiConnector::connect(None, None)?;
//! board.set_mode(OperatingMode::Volts)?;
//! board.set_trigger_mode(TriggerMode::Periodic)?;
//! board.set_trigger_period(Duration::from_millis(250))?;
//! println!("{}", board.read()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acquisition;
pub mod bcd;
pub mod capture;
pub mod clock;
pub mod commands;
pub mod config;
pub mod connector;
pub mod instrument;
pub mod lines;
pub mod terminal;
pub mod trigger;
pub mod units;

// Re-export the main types for convenience
pub use acquisition::{Acquisition, TimedReading};
pub use capture::{RawSample, SampleFlags};
pub use clock::{Clock, MonotonicClock, VirtualClock};
pub use commands::{Command, CommandError};
pub use config::{ConfigError, InstrumentConfig};
pub use connector::{KeiConnector, KeiConnectorError, KeiDevice};
pub use instrument::{Instrument, InstrumentError};
pub use lines::{DigitalLines, Direction, Line, LineError, SimulatedLines};
pub use terminal::{KeiTerminal, KeiTerminalError};
pub use trigger::{TriggerError, TriggerMode, TriggerState, MIN_TRIGGER_PERIOD};
pub use units::{convert, OperatingMode, ParseReadingError, Reading};
