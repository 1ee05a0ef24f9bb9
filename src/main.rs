use std::{
    io::{BufRead, BufReader},
    process::ExitCode,
};

use clap::Parser;
use slotdex::{Call, Config, Session, error};
use tracing::{debug, error as log_error};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("SLOTDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = Config::resolve(&cli.config_overrides())?;
    debug!(?config, "Resolved configuration");

    let input: Box<dyn BufRead> = match &cli.script {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut session = Session::new(&config);
    let failures = run_script(&mut session, input)?;

    if failures > 0 {
        log_error!(failures, "Some calls failed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Run every call in `input`, printing results and failure reports to
/// stdout. Returns how many calls failed.
fn run_script(
    session: &mut Session,
    input: impl BufRead,
) -> error::Result<usize> {
    let mut failures = 0;

    for (number, line) in input.lines().enumerate() {
        let line = line?;
        let result = Call::parse(&line).and_then(|call| match call {
            Some(call) => {
                debug!(line = number + 1, call = call.name(), "Running call");
                call.execute(session).map(Some)
            }
            None => Ok(None),
        });

        match result {
            Ok(Some(output)) => {
                let text = output.to_string();
                if !text.is_empty() {
                    println!("{text}");
                }
            }
            Ok(None) => {}
            Err(err) => {
                failures += 1;
                println!("ERROR: {}", err.report());
            }
        }
    }

    Ok(failures)
}
