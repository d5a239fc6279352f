//! Stackctl - backup, restore and update the managed stack

use clap::Parser;
use owo_colors::OwoColorize;
use stackctl::cli::{Cli, Commands};
use stackctl::{commands, errors};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Backup => commands::backup(&cli.config),
        Commands::Restore { artifact } => commands::restore(&cli.config, &artifact),
        Commands::Update {
            app_version,
            db_version,
            yes,
        } => commands::update(&cli.config, app_version, db_version, yes),
        Commands::Status => commands::status(&cli.config),
        Commands::List => commands::list(&cli.config),
    };

    match result {
        Ok(()) => std::process::exit(errors::EXIT_SUCCESS),
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            std::process::exit(errors::exit_code_for(&err));
        }
    }
}
