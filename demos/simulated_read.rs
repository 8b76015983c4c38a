// Reading from a simulated electrometer
//
// Drives the full capture path (BCD lines, print strobe, trigger and hold lines)
// against an in-memory connector that behaves like a 615 on the bench.

use clap::Parser;
use kei615_rs::{
    Instrument, InstrumentConfig, OperatingMode, SimulatedLines, TriggerMode, MIN_TRIGGER_PERIOD,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "simulated_read")]
#[command(about = "Read a simulated Keithley 615 through the BCD interface")]
struct Args {
    /// Operating mode set on the front panel
    #[arg(short, long, default_value = "V", value_parser = ["V", "O", "C", "A"])]
    mode: String,

    /// Trigger mode
    #[arg(short, long, default_value = "F", value_parser = ["F", "P", "M"])]
    trigger: String,

    /// Trigger period in milliseconds (periodic mode)
    #[arg(short, long, default_value_t = 250)]
    period: u64,

    /// Number of readings to print
    #[arg(short, long, default_value_t = 10)]
    count: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let mode: OperatingMode = args.mode.parse()?;
    let trigger: TriggerMode = args.trigger.parse()?;
    let period = Duration::from_millis(args.period).max(MIN_TRIGGER_PERIOD);

    let lines = Arc::new(SimulatedLines::new());
    let config = InstrumentConfig::default()
        .with_operating_mode(mode)
        .with_trigger_mode(trigger)
        .with_trigger_period(period);
    let instrument = Instrument::init(Arc::clone(&lines), config)?;

    // A slowly drifting input. Every trigger (or every conversion when
    // free-running) strobes whatever is presented at the time.
    let running = Arc::new(AtomicBool::new(true));
    let drift = {
        let lines = Arc::clone(&lines);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut value: u32 = 1000;
            while running.load(Ordering::Relaxed) {
                value = (value + 37) % 2000;
                lines.present(value, 3, 0, value % 3 == 0, value > 1990);
                thread::sleep(Duration::from_millis(20));
            }
        })
    };

    if trigger == TriggerMode::FreeRunning {
        let lines = Arc::clone(&lines);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                lines.strobe();
                thread::sleep(MIN_TRIGGER_PERIOD);
            }
        });
    } else {
        lines.set_respond_to_trigger(true);
    }

    println!("Simulated Keithley 615");
    println!("======================");
    println!("Mode: {mode}");
    println!("Trigger: {trigger}");
    if trigger == TriggerMode::Periodic {
        println!("Period: {} ms", period.as_millis());
    }
    println!();

    for i in 0..args.count {
        match instrument.print() {
            Ok(reading) => println!("{:>3}: {reading}", i + 1),
            Err(e) => eprintln!("{:>3}: {e}", i + 1),
        }
        thread::sleep(period);
    }

    running.store(false, Ordering::Relaxed);
    let _ = drift.join();
    instrument.shutdown();
    Ok(())
}
