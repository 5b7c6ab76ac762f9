// src/main.rs

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use commands::BuildOptions;
use kiln::config::KilnConfig;
use kiln::preflight::{self, SystemProbe};
use tracing::debug;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "kiln", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = cli.config;
    preflight::gate(&SystemProbe, |host| -> Result<()> {
        debug!("Host kernel {} passed preflight", host.kernel);
        let mut config =
            KilnConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
        config.adopt_host(host);
        dispatch(command, &config)
    })
}

fn dispatch(command: Commands, config: &KilnConfig) -> Result<()> {
    match command {
        Commands::Build {
            recipe,
            no_check,
            allow_network,
            force,
            output_dir,
            jobs,
        } => commands::cmd_build(
            config,
            &recipe,
            BuildOptions {
                no_check,
                allow_network,
                force,
                output_dir,
                jobs,
            },
        ),
        Commands::Clean { recipe } => commands::cmd_clean(config, &recipe),
        Commands::Status { recipe } => commands::cmd_status(config, &recipe),
        Commands::Deps { recipe, json } => commands::cmd_deps(config, &recipe, json),
        Commands::Profiles => commands::cmd_profiles(config),
        Commands::Completions { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}
