// Reading through an interface board over USB serial
//
// Discovers the board (or uses the given port), configures it and prints
// readings parsed from its shell.

use clap::Parser;
use kei615_rs::{KeiConnector, OperatingMode, TriggerMode};
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "remote_read")]
#[command(about = "Read a Keithley 615 through its interface board")]
struct Args {
    /// Serial port of the board; discovered when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// USB product name to match during discovery
    #[arg(short, long)]
    name: Option<String>,

    /// Operating mode (V, O, C or A)
    #[arg(short, long, default_value = "V")]
    mode: String,

    /// Trigger period in milliseconds; selects periodic triggering
    #[arg(short, long)]
    period: Option<u64>,

    /// Number of readings
    #[arg(short, long, default_value_t = 5)]
    count: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::init();

    let devices = KeiConnector::get_available_devices(args.name.as_deref())?;
    for device in &devices {
        println!(
            "Found {} at {} (serial {})",
            device.name,
            device.port,
            device.serial_number.as_deref().unwrap_or("unknown")
        );
    }

    let mut board = KeiConnector::connect(args.name.as_deref(), args.port.as_deref())?;
    board.set_mode(args.mode.parse::<OperatingMode>()?)?;

    if let Some(period) = args.period {
        board.set_trigger_mode(TriggerMode::Periodic)?;
        board.set_trigger_period(Duration::from_millis(period))?;
    }

    println!("Mode: {}", board.mode()?);
    println!("Trigger: {}", board.trigger_mode()?);

    for _ in 0..args.count {
        let reading = board.read()?;
        println!("{reading}");
        thread::sleep(Duration::from_millis(args.period.unwrap_or(500)));
    }

    Ok(())
}
