// Logging readings to CSV
//
// Collects a series of readings from a simulated instrument in periodic
// trigger mode and writes them out with polars.

use clap::Parser;
use kei615_rs::acquisition::VALUE_COLUMN_NAME;
use kei615_rs::{
    Acquisition, Instrument, InstrumentConfig, OperatingMode, SimulatedLines, TriggerMode,
};
use polars::prelude::*;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "data_logging")]
#[command(about = "Log Keithley 615 readings to a CSV file")]
struct Args {
    /// Output file
    #[arg(short, long, default_value = "readings.csv")]
    output: String,

    /// Number of readings
    #[arg(short, long, default_value_t = 20)]
    count: usize,

    /// Trigger period in milliseconds
    #[arg(short, long, default_value_t = 100)]
    period: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::init();

    let period = Duration::from_millis(args.period);
    let lines = Arc::new(SimulatedLines::new());
    lines.set_respond_to_trigger(true);
    let instrument = Instrument::init(
        Arc::clone(&lines),
        InstrumentConfig::default()
            .with_operating_mode(OperatingMode::Amperes)
            .with_trigger_mode(TriggerMode::Periodic)
            .with_trigger_period(period),
    )?;

    let mut acquisition = Acquisition::new();
    for i in 0..args.count {
        // A sawtooth that overloads once per cycle
        let digits = (i as u32 * 150) % 2100;
        lines.present(digits.min(1999), 9, 0, false, digits > 1999);
        std::thread::sleep(period);
        acquisition.record(&instrument)?;
    }
    instrument.shutdown();

    acquisition.write_csv(File::create(&args.output)?)?;
    println!("Wrote {} readings to {}", acquisition.len(), args.output);

    let summary = acquisition
        .measured()?
        .select([
            col(VALUE_COLUMN_NAME).min().alias("min"),
            col(VALUE_COLUMN_NAME).max().alias("max"),
            col(VALUE_COLUMN_NAME).mean().alias("mean"),
        ])
        .collect()?;
    println!("{summary}");

    Ok(())
}
