use std::path::{Path, PathBuf};

use clap::Parser;
use ftlog::{appender::FileAppender, LevelFilter, LoggerGuard};
use json::JsonValue;

use mass_spring::{mesher, PolyWriter, SimulationDriver, SimulationError};

/// Simulates a mass-spring mesh falling onto static obstacles and writes one
/// .poly snapshot per frame
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The input json describing the mesh, obstacles and run parameters
    input: PathBuf,

    /// Number of frames to run to. Overrides max_frame in the input file.
    #[arg(short, long)]
    max_frame: Option<usize>,

    /// Directory receiving the <frame>.poly files
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log per-frame energies
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logger.
///
/// # Errors
///
/// - If the logger could not be initialized.
fn configure_logger(log_file: Option<&Path>, verbose: bool) -> Result<LoggerGuard, String> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let builder = ftlog::Builder::new().max_log_level(level);
    // without a root appender ftlog writes to stderr
    let builder = match log_file {
        Some(path) => builder.root(FileAppender::new(path)),
        None => builder,
    };

    builder.try_init().map_err(|e| e.to_string())
}

fn simulate<const D: usize>(input_json: &JsonValue, args: &Args) -> Result<(), SimulationError> {
    let mut setup = mesher::run::<D>(input_json)?;
    if let Some(max_frame) = args.max_frame {
        setup.parameters.max_frame = max_frame;
    }

    let mut driver = SimulationDriver::new(setup.system, setup.obstacles, setup.parameters)?;
    let mut writer = PolyWriter::new(&args.output_dir);
    driver.run(&mut writer)?;

    ftlog::info!("wrote snapshots to {:?}", writer.output_dir());

    Ok(())
}

fn run(args: &Args) -> Result<(), SimulationError> {
    let input_json = mesher::load_input_file(&args.input)?;

    match mesher::read_dimension(&input_json)? {
        2 => simulate::<2>(&input_json, args),
        _ => simulate::<3>(&input_json, args),
    }
}

fn main() {
    let args = Args::parse();

    let guard = match configure_logger(args.log_file.as_deref(), args.verbose) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: failed to configure logger: {err}");
            std::process::exit(1)
        }
    };

    let result = run(&args);
    if let Err(err) = &result {
        ftlog::error!("{err}");
    }
    drop(guard);

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1)
    }
}
