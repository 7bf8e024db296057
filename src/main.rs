use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use common::constants::DEFAULT_MEMORY_SIZE;
use emulator::{Emulator, EmulatorConfig};
use eyre::WrapErr;
use rvdb::Debugger;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Raw binary image loaded at the reset vector. A built-in program runs
    /// when omitted.
    image: Option<PathBuf>,

    /// Run the program to the end without reading commands
    #[arg(short, long)]
    batch: bool,

    /// Write logs to FILE instead of stderr
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Guest memory size in bytes
    #[arg(
        long,
        default_value_t = DEFAULT_MEMORY_SIZE,
        value_parser = clap::value_parser!(u64).range(4..=0x8000_0000)
    )]
    memory_size: u64,
}

fn init_logging(log: Option<&Path>) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("cannot create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
            tracing::info!("Log is written to {}", path.display());
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn main() -> eyre::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref())?;

    let mut emulator = Emulator::new(EmulatorConfig {
        memory_size: cli.memory_size,
        ..Default::default()
    });
    match &cli.image {
        Some(path) => emulator.load_image(path)?,
        None => emulator.load_builtin_image()?,
    };

    let mut debugger = Debugger::new(emulator, io::stdout().lock());
    if cli.batch {
        debugger.set_batch_mode();
    }
    debugger.mainloop(io::stdin().lock())?;

    match debugger.emulator().is_exit_status_bad() {
        true => Ok(ExitCode::FAILURE),
        false => Ok(ExitCode::SUCCESS),
    }
}
