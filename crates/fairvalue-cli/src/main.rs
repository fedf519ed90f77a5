mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::scenarios::{MonteCarloArgs, SensitivityArgs};
use commands::valuation::{BlendArgs, CompsArgs, DcfArgs};

/// Single-company equity fair value
#[derive(Parser)]
#[command(
    name = "fairvalue",
    version,
    about = "Single-company equity fair value: DCF, trading comps and blends",
    long_about = "Values one company from a data-feed stock record. Runs a FCFF DCF \
                  with a fallback cash-flow cascade, trading comparables over a peer \
                  universe, a confidence-weighted blend, a WACC x terminal growth \
                  sensitivity grid and a Monte Carlo DCF. Input is JSON from --input \
                  or stdin; diagnostics go to stderr (RUST_LOG)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Assumption set (JSON or YAML) replacing the built-in regions and sectors
    #[arg(long, global = true)]
    assumptions: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discounted cash flow valuation of one stock
    Dcf(DcfArgs),
    /// Trading comparables against a peer universe
    Comps(CompsArgs),
    /// DCF + comps blended into one fair value
    Blend(BlendArgs),
    /// WACC x terminal growth sensitivity grid
    Sensitivity(SensitivityArgs),
    /// Monte Carlo DCF over growth, terminal growth, beta and ERP
    MonteCarlo(MonteCarloArgs),
    /// Print the active region and sector assumptions
    Regions,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("fairvalue {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let assumptions = match commands::assumptions::load_assumptions(cli.assumptions.as_deref()) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };
    debug!(regions = ?assumptions.region_names(), "assumption set loaded");

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Dcf(args) => commands::valuation::run_dcf(args, &assumptions),
        Commands::Comps(args) => commands::valuation::run_comps(args, &assumptions),
        Commands::Blend(args) => commands::valuation::run_blend(args, &assumptions),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args, &assumptions),
        Commands::MonteCarlo(args) => commands::scenarios::run_monte_carlo(args, &assumptions),
        Commands::Regions => commands::assumptions::run_regions(&assumptions),
        Commands::Version => return,
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
