//! Thin command-line frontend for the um32 interpreter.
//!
//! Out of scope for the core by design: argument parsing, usage text,
//! the file-open/read wrapper, and the standard-I/O console. Kept here
//! so the library crate stays embeddable (a host can swap in its own
//! byte source/sink without linking a CLI).

use std::process::ExitCode;

use um32::io::{StdinSource, StdoutSink};
use um32::{Machine, UmError};

fn print_usage() {
    eprintln!("Usage: um32 [OPTIONS] FILE");
    eprintln!("Options:");
    eprintln!("  -h, --help          display this information");
}

enum Outcome {
    Ran,
    UsageError,
}

fn run(args: Vec<String>) -> Result<Outcome, UmError> {
    if args.len() != 1 {
        print_usage();
        return Ok(Outcome::UsageError);
    }

    let arg = &args[0];
    if arg == "-h" || arg == "--help" {
        print_usage();
        return Ok(Outcome::UsageError);
    }

    let bytes = std::fs::read(arg).map_err(|e| UmError::FailLoadIo(e.to_string()))?;

    let mut machine = Machine::new(Box::new(StdinSource), Box::new(StdoutSink));
    machine.load_program(&bytes)?;

    let reason = machine.run()?;
    log::info!("machine halted: {reason:?}");
    Ok(Outcome::Ran)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(Outcome::Ran) => ExitCode::SUCCESS,
        Ok(Outcome::UsageError) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("[{}] {e}", e.kind());
            eprintln!("um32: {e}");
            ExitCode::FAILURE
        }
    }
}
