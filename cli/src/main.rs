//! dbacl CLI - Score text against categories and act on the scores.
//!
//! This is the main entry point for the `dbacl` command-line tool.

mod commands;

use clap::{Parser, Subcommand};
use commands::{BayesolCommand, DumpCommand, HypexCommand, ScoreCommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dbacl")]
#[command(about = "Bayesian text classification with digramic reference models", long_about = None)]
#[command(version)]
struct Cli {
    /// Log progress to stderr (repeat for per-token detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score documents against one or more categories
    Score(ScoreCommand),
    /// Choose the Bayes-optimal category from a risk specification
    Bayesol(BayesolCommand),
    /// Divergences and Chernoff information of two category dumps
    Hypex(HypexCommand),
    /// Dump the weights of the tokens found in the input
    Dump(DumpCommand),
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Commands::Score(cmd) => commands::score::run(cmd, cli.json)?,
        Commands::Bayesol(cmd) => commands::bayesol::run(cmd, cli.json)?,
        Commands::Hypex(cmd) => commands::hypex::run(cmd, cli.json)?,
        Commands::Dump(cmd) => commands::dump::run(cmd)?,
    };

    Ok(ExitCode::from(code))
}
