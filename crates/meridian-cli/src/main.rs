mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::optimize::{EstimateArgs, FrontierArgs, OptimizeArgs};

/// Constrained mean-variance portfolio optimization
#[derive(Parser)]
#[command(
    name = "meridian",
    version,
    about = "Constrained mean-variance portfolio optimization",
    long_about = "Builds a long-only efficient frontier under diversification caps from \
                  price history or supplied estimates, selects one portfolio from a stated \
                  preference and reports weights, risk and return analytics with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate from price history, sweep the frontier and select a portfolio
    Optimize(OptimizeArgs),
    /// Sweep the frontier over supplied expected returns and covariance
    Frontier(FrontierArgs),
    /// Estimate expected returns and covariance only
    Estimate(EstimateArgs),
    /// Print the built-in capital market assumptions and default universe
    Assumptions,
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
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Frontier(args) => commands::optimize::run_frontier(args),
        Commands::Estimate(args) => commands::optimize::run_estimate(args),
        Commands::Assumptions => commands::assumptions::run_assumptions(),
        Commands::Version => {
            println!("meridian {}", env!("CARGO_PKG_VERSION"));
            return;
        }
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
