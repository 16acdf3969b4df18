// tinyos: runs one process per program file until every process has exited
use std::path::PathBuf;

use anyhow::{bail, Context, Result as AnyhowResult};
use clap::Parser;
use env_logger::Builder as LogBuilder;
use log::{info, LevelFilter};

use tinyos::{app, config::Config, sim::console::Console};

#[derive(Parser, Debug)]
#[command(name = "tinyos")]
#[command(about = "A tiny virtual CPU and operating system with paged memory and a priority scheduler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// JSON configuration file; missing keys take their defaults
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Directory for swapped-out pages (in memory when omitted)
    #[arg(long)]
    swap_dir: Option<PathBuf>,

    /// Verbose logging output
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optional virtual memory size in bytes, followed by the program files
    #[arg(value_name = "[VIRTUAL_MEMORY] FILES", required = true)]
    inputs: Vec<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    LogBuilder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn split_inputs(inputs: &[String]) -> AnyhowResult<(Option<u32>, Vec<PathBuf>)> {
    let (virtual_memory, files) = match inputs.split_first() {
        Some((first, rest)) if !rest.is_empty() => match first.parse::<u32>() {
            Ok(size) => (Some(size), rest),
            Err(_) => (None, inputs),
        },
        _ => (None, inputs),
    };
    if files.is_empty() {
        bail!("no program files given");
    }
    Ok((virtual_memory, files.iter().map(PathBuf::from).collect()))
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let (virtual_memory, files) = split_inputs(&args.inputs)?;
    if let Some(size) = virtual_memory {
        config.virtual_memory = size;
    }
    if args.swap_dir.is_some() {
        config.swap_dir = args.swap_dir;
    }

    println!(
        "Physical memory: {} bytes, virtual memory: {} bytes, page size: {} bytes",
        config.physical_memory, config.virtual_memory, config.page_size
    );
    let summary = app::run(&config, &files, Console::stdio())?;
    info!(
        "halted after {} clock cycles, {} processes run",
        summary.clock,
        summary.stats.len()
    );
    Ok(())
}
