pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use carwise_core::config::{AppConfig, LoadOptions};
use clap::{Parser, Subcommand};

use crate::commands::advise::AdviseArgs;
use crate::commands::fit::FitArgs;
use crate::commands::prepare::PrepareArgs;
use crate::commands::similar::SimilarCleanArgs;
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "carwise",
    about = "Carwise used-car pricing CLI",
    long_about = "Prepare listing data, fit per-cohort price regressions, and ask for deal advice.",
    after_help = "Examples:\n  carwise prepare --input vehicles.csv --output clean.csv\n  carwise fit --listings clean.csv\n  carwise advise \"honda, civic, 2015, 45000, 9000\" --kind mileage"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to carwise.toml or config/carwise.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Clean a raw listings CSV and optionally split it by description")]
    Prepare(PrepareArgs),
    #[command(about = "Fit and persist regressions for one cohort or every cohort in a table")]
    Fit(FitArgs),
    #[command(about = "Price a listing and grade the deal")]
    Advise(AdviseArgs),
    #[command(about = "Restrict a raw similarity map to vehicles present in the listings")]
    SimilarClean(SimilarCleanArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Prepare(_) => "prepare",
            Self::Fit(_) => "fit",
            Self::Advise(_) => "advise",
            Self::SimilarClean(_) => "similar-clean",
            Self::Config => "config",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(&cli);
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub fn execute(cli: &Cli) -> CommandResult {
    let options = LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                cli.command.name(),
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    logging::init(&config);

    match &cli.command {
        Command::Prepare(args) => commands::prepare::run(&config, args),
        Command::Fit(args) => commands::fit::run(&config, args),
        Command::Advise(args) => commands::advise::run(&config, args),
        Command::SimilarClean(args) => commands::similar::run(&config, args),
        Command::Config => CommandResult {
            exit_code: 0,
            output: commands::config::run(&config, cli.config.as_deref()),
        },
    }
}
