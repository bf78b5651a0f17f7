//! dlharness - run one bundled Datalog program over a fact directory
//!
//! Usage:
//!   dlharness ./data/in [--program movies] [--output ./data/out] [--threads 4]
//!
//! Loads every input relation from the input directory, evaluates the
//! program and writes every output relation into the output directory.
//! Exits with a distinct non-zero code per error kind.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dlharness::config::{EngineConfig, THREADS_ENV};
use dlharness::{HarnessError, ProgramRegistry, Result, RunStats};

/// Environment variable holding the tracing filter
const LOG_ENV: &str = "DLHARNESS_LOG";

/// Path reported for failures writing to standard output
const STDOUT: &str = "<stdout>";

/// Run a bundled Datalog program: load facts, evaluate, print outputs.
#[derive(Parser)]
#[command(name = "dlharness")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding one fact file per input relation
    input_dir: PathBuf,

    /// Program to instantiate
    #[arg(short, long, default_value = "movies")]
    program: String,

    /// Directory receiving one file per output relation
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Worker threads for evaluation (0 = one per core)
    #[arg(short, long, env = THREADS_ENV)]
    threads: Option<usize>,

    /// Print run statistics as JSON on stdout
    #[arg(long)]
    stats: bool,

    /// Print every output relation on stdout
    #[arg(long)]
    dump: bool,

    /// List the bundled programs and exit
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let mut config = EngineConfig::default();
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }
    let registry = ProgramRegistry::builtin()?.with_config(config);

    if cli.list {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    registry.with_program(&cli.program, |handle| {
        handle.load_all(&cli.input_dir)?;
        let stats = handle.run()?;
        handle.print_all(&cli.output)?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        if cli.dump {
            handle.dump_outputs(&mut out)?;
        }
        if cli.stats {
            write_stats(&mut out, &stats)?;
        }
        Ok(())
    })
}

/// Print run statistics as pretty JSON
fn write_stats(out: &mut dyn Write, stats: &RunStats) -> Result<()> {
    let json = serde_json::to_string_pretty(stats)
        .map_err(|e| HarnessError::output_write(STDOUT, format!("cannot encode stats: {}", e)))?;
    writeln!(out, "{}", json).map_err(|e| HarnessError::output_io(STDOUT, "cannot write stats", e))
}
