// Interactive `kei` shell over a simulated connector
//
// Accepts the same commands as the interface board's shell:
//   kei read | kei mode [V|O|C|A] | kei trig mode [F|P|M] | kei trig period [ms]

use clap::Parser;
use kei615_rs::commands;
use kei615_rs::{Instrument, InstrumentConfig, SimulatedLines};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "shell")]
#[command(about = "Interactive kei shell against a simulated Keithley 615")]
struct Args {
    /// Digits shown by the simulated instrument (0 to 1999)
    #[arg(short, long, default_value_t = 1234)]
    digits: u32,

    /// Range exponent shown by the simulated instrument
    #[arg(short, long, default_value_t = 3)]
    range: u8,

    /// Negative polarity
    #[arg(short, long)]
    negative: bool,
}

const PROMPT: &str = "uart:~$ ";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::init();

    let lines = Arc::new(SimulatedLines::new());
    lines.set_respond_to_trigger(true);
    let instrument = Instrument::init(Arc::clone(&lines), InstrumentConfig::default())?;

    lines.present(args.digits.min(1999), args.range, 0, args.negative, false);
    lines.strobe();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("{PROMPT}");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if !line.is_empty() {
            match commands::execute(&instrument, line) {
                Ok(output) if output.is_empty() => {}
                Ok(output) => println!("{output}"),
                Err(e) => println!("{e}"),
            }
        }
        print!("{PROMPT}");
        stdout.flush()?;
    }

    instrument.shutdown();
    Ok(())
}
