use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use structopt::StructOpt;
use tracing::warn;

use mulhash::{
    CancelToken, Error, HashParameters, MultiplicativeHash, OutputFormat, ProgressObserver,
    SearchConfig, Searcher, WriterSink,
};

const MAX_COLLISIONS: u64 = 1 << 32;

/// Generates colliding inputs for a 32-bit multiplicative hash
///
/// The hash starts from the initial value and folds each input byte in as
/// digest = digest * multiplier + byte (mod 2^32). Collisions are found with a meet-in-the-middle
/// attack: backward hashes of every suffix are precomputed for the target digest, then random
/// prefixes are drawn until one meets the table.
#[derive(Debug, StructOpt)]
struct Cli {
    /// Output format: 'c' for a C-style byte array, 'hex' for hexadecimal, 'bytes' for an escaped
    /// byte string
    #[structopt(short, long, default_value = "bytes", possible_values = &["c", "hex", "bytes"])]
    format: OutputFormat,
    /// File to write the collisions to. Prints them to stdout if not provided
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
    /// Prefix size
    #[structopt(short, long, default_value = "7")]
    prefix: usize,
    /// Suffix size. Dictates the size of the precomputation table
    #[structopt(short, long, default_value = "3")]
    suffix: usize,
    /// Initial value of the multiplicative hash
    #[structopt(short, long, default_value = "5387", parse(try_from_str = parse_u32))]
    initial: u32,
    /// Multiplier of the multiplicative hash, must be odd
    #[structopt(short, long, default_value = "31", parse(try_from_str = parse_u32))]
    multiplier: u32,
    /// Number of collisions to compute (max: 2^32)
    #[structopt(short, long = "n-collisions", default_value = "100")]
    n_collisions: u64,
    /// Target hash, drawn at random if not provided
    #[structopt(short, long, parse(try_from_str = parse_u32))]
    target: Option<u32>,
    /// Show a progress bar while precomputing
    #[structopt(long)]
    interactive: bool,
    /// Build the table and search in parallel
    #[structopt(long)]
    parallel: bool,
    /// Number of search workers when running in parallel, defaults to the number of CPUs
    #[structopt(long)]
    threads: Option<usize>,
    /// Stop after this many random prefixes even if not all collisions were found
    #[structopt(long)]
    max_attempts: Option<u64>,
}

/// Parses decimal or 0x-prefixed hexadecimal
fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Prints the target and, in interactive mode, a progress bar on stderr while the table is built
struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    fn new(interactive: bool) -> Self {
        let bar = if interactive {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::with_template("Progress: [{bar:40}] {percent}% ({eta})") {
                bar.set_style(style.progress_chars("#-"));
            }
            Some(bar)
        } else {
            None
        };
        Progress { bar }
    }
}

impl ProgressObserver for Progress {
    fn target_chosen(&mut self, target: u32) {
        eprintln!("Target hash: {}", target);
    }

    fn precompute_progress(&mut self, current: u64, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total);
            bar.set_position(current);
            if current == total {
                bar.finish();
            }
        }
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    if args.n_collisions > MAX_COLLISIONS {
        bail!("number of collisions cannot exceed 2^32 ({})", MAX_COLLISIONS);
    }

    let hash = MultiplicativeHash::new(HashParameters {
        initial_value: args.initial,
        multiplier: args.multiplier,
    })?;

    let mut config = SearchConfig::new(args.prefix, args.suffix, args.n_collisions)?;
    if let Some(target) = args.target {
        config = config.with_target(target);
    }
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    if let Some(max_attempts) = args.max_attempts {
        config = config.with_max_attempts(max_attempts);
    }

    // Open the destination before any work so a bad path fails fast
    let writer: Box<dyn Write> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(Error::from)
                .with_context(|| format!("could not open output file '{}'", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout()),
    };
    let mut sink = WriterSink::new(writer, args.format);

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())
        .context("could not install the interrupt handler")?;

    let searcher = Searcher::new(hash, config).with_cancel(cancel);
    let mut progress = Progress::new(args.interactive);
    let result = if args.parallel {
        searcher.par_run(&mut sink, &mut progress)
    } else {
        searcher.run(&mut sink, &mut progress)
    };

    // Whatever was found so far reaches the destination, even when interrupted
    sink.flush()?;

    match result {
        Ok(report) => {
            if report.found < args.n_collisions {
                warn!(
                    "Gave up after {} attempts with {} of {} collisions",
                    report.attempts, report.found, args.n_collisions
                );
            }
        }
        Err(Error::Interrupted) => {
            eprintln!("\nAttack interrupted by user after {} collisions", sink.written());
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(path) = &args.output {
        eprintln!("Collisions written to {}", path.display());
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mulhash=info".into()),
        )
        .init();

    let args = Cli::from_args();

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
