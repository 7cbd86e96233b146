//! Cell Constraints CLI
//!
//! Usage:
//!   cell-constraints [OPTIONS] [FILE]
//!
//! Options:
//!   -c, --config <FILE>  Settings file (TOML format)
//!   -v, --verbose        Log more (repeat for debug and trace)
//!       --check          Report connectivity defects; exit 1 if any
//!   -q, --quiet          Do not print the final design
//!   -h, --help           Print help

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use cell_constraints::dump::dump;
use cell_constraints::{run_with_config, Config};

#[derive(Parser)]
#[command(name = "cell-constraints")]
#[command(about = "Propagate edits through a hierarchical layout description")]
struct Cli {
    /// Input file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Settings file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log more: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Report connectivity defects and exit with status 1 if there are any
    #[arg(long)]
    check: bool,

    /// Do not print the final design
    #[arg(short, long)]
    quiet: bool,
}

fn log_filter(verbose: u8, configured: Option<&str>) -> EnvFilter {
    let level = match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    };
    if let Some(level) = level {
        return EnvFilter::new(level);
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(configured.unwrap_or("warn"))
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, config.log_filter.as_deref()))
        .with_writer(io::stderr)
        .init();

    let (source, filename) = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => (content, path.display().to_string()),
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => (buffer, "<stdin>".to_string()),
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let output = match run_with_config(&source, &config.propagation) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{}", e.format(&source, &filename));
            std::process::exit(1);
        }
    };

    if !cli.quiet {
        match dump(&output.design) {
            Ok(text) => print!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        for (i, report) in output.reports.iter().enumerate() {
            let s = &report.stats;
            println!(
                "batch {}: {} nodes moved, {} arcs moved, {} jogs ({} failed), {} cells resized",
                i + 1,
                s.nodes_altered,
                s.arc_moves,
                s.jogs,
                s.failed_jogs,
                report.resized_cells.len()
            );
        }
    }

    if cli.check {
        for defect in &output.defects {
            println!("{}", defect);
        }
        if !output.defects.is_empty() {
            std::process::exit(1);
        }
    }
}
