//! device: command-line front end for socket and AFO shell generation.
//!
//! Runs the staged generator from device-shell over a scan and a trim
//! curve, and inspects connector geometry and configuration files.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=device_shell=info` - Stage summaries
//! - `RUST_LOG=device_shell=debug` - Cache hits and remesh passes
//! - `RUST_LOG=mesh_kernel::timing=debug` - Operation timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Socket from a scan, trimmed 150 mm above the scan's lowest point
//! device generate limb.stl --trim-height 150 --preset socket -o socket.obj
//!
//! # Same with a saved trim curve and a configuration file
//! RUST_LOG=device_shell=info device generate limb.stl --curve trim.json \
//!     --config socket.toml -o socket.stl
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use device_shell::Stage;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{config, connector, generate, info};

/// device - Generate socket and AFO shells from limb scans.
#[derive(Parser)]
#[command(name = "device")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Preset {
    /// Connector merged into the bottom of the shell
    Socket,
    /// Flattened sole
    Afo,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a device shell from a scan and a trim curve
    Generate(GenerateArgs),

    /// Build connector geometry and report its dimensions
    Connector {
        /// Configuration file with a [connector] table
        #[arg(long)]
        config: Option<PathBuf>,

        /// Outside diameter in mm, overriding the configuration
        #[arg(long)]
        diameter: Option<f64>,

        /// Save both connector parts to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Display mesh statistics, including shell groups
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Show volume and surface area
        #[arg(long)]
        detailed: bool,
    },

    /// Write or check generator configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Scanned limb (STL or OBJ)
    input: PathBuf,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    /// Trim curve as JSON (`{"points": [[x, y, z], ...]}`)
    #[arg(long, conflicts_with = "trim_height", required_unless_present = "trim_height")]
    curve: Option<PathBuf>,

    /// Trim with a horizontal circle this far above the scan's lowest point
    #[arg(long)]
    trim_height: Option<f64>,

    /// Generator configuration (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from a preset instead of a configuration file
    #[arg(long, conflicts_with = "config")]
    preset: Option<Preset>,

    /// Gap between the scan and the inner wall in mm
    #[arg(long)]
    inner_offset: Option<f64>,

    /// Wall thickness in mm
    #[arg(long, short)]
    thickness: Option<f64>,

    /// Extra offset at the trim line in mm
    #[arg(long, requires = "flare_band")]
    flare_offset: Option<f64>,

    /// Width of the flare band in mm
    #[arg(long, requires = "flare_offset")]
    flare_band: Option<f64>,

    /// Keep the part above the trim curve
    #[arg(long)]
    flip: bool,

    /// Build offset surfaces from a distance grid
    #[arg(long)]
    sdf: bool,

    /// Stop after this stage and save its mesh
    #[arg(long, value_parser = parse_stage)]
    stop_after: Option<Stage>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print or save an example configuration
    Example {
        /// Preset to start from
        #[arg(long, default_value = "socket")]
        preset: Preset,

        /// Save to this file (.toml or .json) instead of printing TOML
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and validate a configuration file
    Check {
        /// Configuration file
        path: PathBuf,
    },
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse::<Stage>().map_err(|e| e.to_string())
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "device_shell=info,mesh_kernel=info",
            2 => "device_shell=debug,mesh_kernel=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Generate(args) => generate::run(args, &cli),
        Commands::Connector {
            config,
            diameter,
            output,
        } => connector::run(config.as_deref(), *diameter, output.as_deref(), &cli),
        Commands::Info { input, detailed } => info::run(input, *detailed, &cli),
        Commands::Config { action } => config::run(action, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(shell_err) = e.downcast_ref::<device_shell::ShellError>() {
                eprintln!("{}: {}", "Error".red().bold(), shell_err);
                eprintln!("  {}: {}", "Code".cyan(), shell_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    shell_err.recovery_suggestion()
                );
            } else if let Some(mesh_err) = e.downcast_ref::<mesh_kernel::MeshError>() {
                eprintln!("{}: {}", "Error".red().bold(), mesh_err);
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    mesh_err.recovery_suggestion()
                );
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
